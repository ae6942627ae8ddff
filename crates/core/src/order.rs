//! Orders and the order status machine.
//!
//! Checkout snapshots a priced cart into an [`Order`]: titles and prices are
//! copied onto each [`OrderItem`] so later product edits never rewrite order
//! history. Status then moves through
//!
//! ```text
//! pending -> paid -> shipped -> delivered
//!    |        |
//!    +--------+--> cancelled
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::CartView;
use crate::types::{ClaimId, Money, MoneyError, OrderId, ProductId, UserId};

/// Where an order is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether `self -> next` is an edge of the status machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Cancelled)
                | (Self::Paid, Self::Shipped | Self::Cancelled)
                | (Self::Shipped, Self::Delivered)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_owned())),
        }
    }
}

/// Who is asking to change an order's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderActor {
    /// The customer who placed the order.
    Buyer,
    /// A seller with at least one item in the order.
    Seller,
    Admin,
}

/// Order failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("only {available} of '{title}' left in stock, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        title: String,
        requested: u32,
        available: u32,
    },
    #[error("cannot change order status from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    #[error("you are not allowed to set this order to {0}")]
    NotAllowed(OrderStatus),
    #[error("unknown order status: {0}")]
    UnknownStatus(String),
    #[error("order total is too large")]
    Money(#[from] MoneyError),
}

/// One purchased line, frozen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub affiliate_id: Option<UserId>,
    pub claim_id: Option<ClaimId>,
    pub title: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub quantity: u32,
    /// What the buyer paid per unit.
    pub unit_price: Money,
    /// The seller's sale price per unit at checkout.
    pub base_unit_price: Money,
}

impl OrderItem {
    /// Buyer price times quantity.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the total does not fit.
    pub fn line_total(&self) -> Result<Money, MoneyError> {
        self.unit_price.times(self.quantity)
    }

    /// Affiliate earnings on this line; zero for direct sales.
    #[must_use]
    pub fn commission(&self) -> Money {
        if self.affiliate_id.is_none() {
            return Money::ZERO;
        }
        self.unit_price
            .checked_sub(self.base_unit_price)
            .and_then(|per_unit| per_unit.times(self.quantity).ok())
            .unwrap_or(Money::ZERO)
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Units requested per product across a priced cart.
#[must_use]
pub fn stock_demand(items: &[OrderItem]) -> HashMap<ProductId, u32> {
    let mut demand = HashMap::new();
    for item in items {
        *demand.entry(item.product_id).or_insert(0_u32) += item.quantity;
    }
    demand
}

impl Order {
    /// Turn a freshly priced cart into a pending order.
    ///
    /// Stock is checked per product, summing lines that differ only by
    /// variant or claim. The store must re-check when it reserves stock.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::EmptyCart`] or
    /// [`OrderError::InsufficientStock`] for the first short product.
    pub fn place(
        id: OrderId,
        buyer_id: UserId,
        cart: &CartView,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if cart.lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let items: Vec<OrderItem> = cart
            .lines
            .iter()
            .map(|priced| OrderItem {
                product_id: priced.line.product_id,
                seller_id: priced.seller_id,
                affiliate_id: priced.affiliate_id,
                claim_id: priced.line.claim_id,
                title: priced.title.clone(),
                color: priced.line.color.clone(),
                size: priced.line.size.clone(),
                quantity: priced.line.quantity,
                unit_price: priced.unit_price,
                base_unit_price: priced.base_unit_price,
            })
            .collect();

        let demand = stock_demand(&items);
        for priced in &cart.lines {
            let requested = demand.get(&priced.line.product_id).copied().unwrap_or(0);
            if requested > priced.available {
                return Err(OrderError::InsufficientStock {
                    product_id: priced.line.product_id,
                    title: priced.title.clone(),
                    requested,
                    available: priced.available,
                });
            }
        }

        let total = Money::total(
            items
                .iter()
                .map(OrderItem::line_total)
                .collect::<Result<Vec<_>, _>>()?,
        )?;

        Ok(Self {
            id,
            buyer_id,
            items,
            total,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move the order to `next` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::IllegalTransition`] for a move the status
    /// machine does not allow and [`OrderError::NotAllowed`] when a buyer
    /// tries anything but cancelling a pending order.
    pub fn transition(
        &mut self,
        next: OrderStatus,
        actor: OrderActor,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        if actor == OrderActor::Buyer
            && !(self.status == OrderStatus::Pending && next == OrderStatus::Cancelled)
        {
            return Err(OrderError::NotAllowed(next));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    #[must_use]
    pub fn involves_seller(&self, seller_id: UserId) -> bool {
        self.items.iter().any(|i| i.seller_id == seller_id)
    }

    #[must_use]
    pub fn involves_affiliate(&self, affiliate_id: UserId) -> bool {
        self.items.iter().any(|i| i.affiliate_id == Some(affiliate_id))
    }

    /// Commission earned by one affiliate on this order.
    #[must_use]
    pub fn commission_for(&self, affiliate_id: UserId) -> Money {
        // Each commission is at most its line total, so the sum fits in `total`
        Money::total(
            self.items
                .iter()
                .filter(|i| i.affiliate_id == Some(affiliate_id))
                .map(OrderItem::commission),
        )
        .unwrap_or(self.total)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cart::{CartLine, PricedLine};
    use crate::catalog::tests::money;
    use crate::types::CartLineId;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    fn priced(product_id: ProductId, qty: u32, available: u32, affiliate: bool) -> PricedLine {
        let (unit, affiliate_id) = if affiliate {
            (money("30"), Some(UserId::generate()))
        } else {
            (money("20"), None)
        };
        PricedLine {
            line: CartLine {
                id: CartLineId::generate(),
                product_id,
                claim_id: affiliate.then(ClaimId::generate),
                color: None,
                size: None,
                quantity: qty,
            },
            title: "Tee".into(),
            image: None,
            seller_id: UserId::generate(),
            affiliate_id,
            unit_price: unit,
            base_unit_price: money("20"),
            line_total: unit.times(qty).unwrap(),
            available,
        }
    }

    fn view(lines: Vec<PricedLine>) -> CartView {
        CartView {
            item_count: lines.iter().map(|l| l.line.quantity).sum(),
            subtotal: Money::total(lines.iter().map(|l| l.line_total)).unwrap(),
            lines,
        }
    }

    fn pending() -> Order {
        Order::place(
            OrderId::generate(),
            UserId::generate(),
            &view(vec![priced(ProductId::generate(), 1, 5, false)]),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_status_machine_edges() {
        let allowed: Vec<_> = ALL
            .iter()
            .flat_map(|a| ALL.iter().map(move |b| (*a, *b)))
            .filter(|(a, b)| a.can_transition_to(*b))
            .collect();
        assert_eq!(
            allowed,
            vec![
                (OrderStatus::Pending, OrderStatus::Paid),
                (OrderStatus::Pending, OrderStatus::Cancelled),
                (OrderStatus::Paid, OrderStatus::Shipped),
                (OrderStatus::Paid, OrderStatus::Cancelled),
                (OrderStatus::Shipped, OrderStatus::Delivered),
            ]
        );
    }

    #[test]
    fn test_status_parses() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_place_totals_and_status() {
        let product = ProductId::generate();
        let order = Order::place(
            OrderId::generate(),
            UserId::generate(),
            &view(vec![priced(product, 2, 5, false), priced(product, 1, 5, true)]),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, money("70"));
        assert_eq!(stock_demand(&order.items)[&product], 3);
    }

    #[test]
    fn test_place_rejects_total_past_max() {
        let product = ProductId::generate();
        let mut lines = vec![
            priced(product, 1, 5, false),
            priced(product, 1, 5, false),
        ];
        for line in &mut lines {
            line.unit_price = Money::MAX;
            line.base_unit_price = Money::MAX;
            line.line_total = Money::MAX;
        }
        let cart = CartView {
            item_count: 2,
            subtotal: Money::MAX,
            lines,
        };
        assert_eq!(
            Order::place(OrderId::generate(), UserId::generate(), &cart, Utc::now()),
            Err(OrderError::Money(MoneyError::Overflow))
        );
    }

    #[test]
    fn test_place_rejects_empty_and_oversell() {
        assert_eq!(
            Order::place(OrderId::generate(), UserId::generate(), &view(vec![]), Utc::now()),
            Err(OrderError::EmptyCart)
        );
        // Two lines of the same product together exceed stock.
        let product = ProductId::generate();
        let err = Order::place(
            OrderId::generate(),
            UserId::generate(),
            &view(vec![priced(product, 2, 3, false), priced(product, 2, 3, true)]),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_buyer_may_only_cancel_pending() {
        let mut order = pending();
        assert_eq!(
            order.transition(OrderStatus::Paid, OrderActor::Buyer, Utc::now()),
            Err(OrderError::NotAllowed(OrderStatus::Paid))
        );
        order
            .transition(OrderStatus::Paid, OrderActor::Seller, Utc::now())
            .unwrap();
        assert_eq!(
            order.transition(OrderStatus::Cancelled, OrderActor::Buyer, Utc::now()),
            Err(OrderError::NotAllowed(OrderStatus::Cancelled))
        );
        order
            .transition(OrderStatus::Cancelled, OrderActor::Admin, Utc::now())
            .unwrap();
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut order = pending();
        assert_eq!(
            order.transition(OrderStatus::Delivered, OrderActor::Admin, Utc::now()),
            Err(OrderError::IllegalTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Delivered
            })
        );
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_commission_per_affiliate() {
        let line = priced(ProductId::generate(), 3, 5, true);
        let affiliate = line.affiliate_id.unwrap();
        let order = Order::place(
            OrderId::generate(),
            UserId::generate(),
            &view(vec![line, priced(ProductId::generate(), 1, 5, false)]),
            Utc::now(),
        )
        .unwrap();
        assert!(order.involves_affiliate(affiliate));
        assert_eq!(order.commission_for(affiliate), money("30"));
        assert_eq!(order.commission_for(UserId::generate()), Money::ZERO);
    }
}
