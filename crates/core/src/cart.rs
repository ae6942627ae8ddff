//! Shopping carts.
//!
//! A [`Cart`] lives in the buyer's session and only records *what* they want:
//! product, optional affiliate claim, variant and quantity. Prices are never
//! stored in the cart; [`price_cart`] resolves them from current product and
//! claim records each time the cart is shown or checked out.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{Product, find_label};
use crate::claim::Claim;
use crate::types::{CartLineId, ClaimId, Money, MoneyError, ProductId, UserId};

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Reasons a cart change is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    QuantityOutOfRange,
    #[error("cart line not found")]
    LineNotFound,
    #[error("this product requires a {0} choice")]
    VariantRequired(&'static str),
    #[error("{kind} '{value}' is not available for this product")]
    UnknownVariant { kind: &'static str, value: String },
    #[error("claim does not belong to this product")]
    ClaimMismatch,
    #[error("this storefront listing is no longer available")]
    ClaimUnavailable,
    #[error("cart total is too large")]
    Money(#[from] MoneyError),
}

/// One line of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub product_id: ProductId,
    /// Set when the product was added from an affiliate storefront.
    pub claim_id: Option<ClaimId>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub quantity: u32,
}

impl CartLine {
    fn same_item(&self, other: &Self) -> bool {
        self.product_id == other.product_id
            && self.claim_id == other.claim_id
            && self.color == other.color
            && self.size == other.size
    }
}

/// A buyer's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

/// Resolve a requested variant against the product's own labels.
fn pick_variant(
    labels: &[String],
    wanted: Option<&str>,
    kind: &'static str,
) -> Result<Option<String>, CartError> {
    let wanted = wanted.map(str::trim).filter(|w| !w.is_empty());
    match (labels.is_empty(), wanted) {
        (true, None) => Ok(None),
        (false, None) => Err(CartError::VariantRequired(kind)),
        (_, Some(w)) => find_label(labels, w)
            .map(|label| Some(label.to_owned()))
            .ok_or_else(|| CartError::UnknownVariant {
                kind,
                value: w.to_owned(),
            }),
    }
}

fn check_quantity(quantity: u32) -> Result<u32, CartError> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(quantity)
    } else {
        Err(CartError::QuantityOutOfRange)
    }
}

impl Cart {
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Add `quantity` units of a product, merging with an existing line for
    /// the same product, claim and variant.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the variant does not exist on the product,
    /// the claim is for another product or no longer marks it up, or the
    /// resulting quantity is outside `1..=MAX_LINE_QUANTITY`.
    pub fn add(
        &mut self,
        product: &Product,
        claim: Option<&Claim>,
        color: Option<&str>,
        size: Option<&str>,
        quantity: u32,
    ) -> Result<CartLineId, CartError> {
        check_quantity(quantity)?;
        if let Some(claim) = claim {
            if claim.product_id != product.id {
                return Err(CartError::ClaimMismatch);
            }
            if !claim.is_marked_up(product) {
                return Err(CartError::ClaimUnavailable);
            }
        }

        let candidate = CartLine {
            id: CartLineId::generate(),
            product_id: product.id,
            claim_id: claim.map(|c| c.id),
            color: pick_variant(&product.colors, color, "color")?,
            size: pick_variant(&product.sizes, size, "size")?,
            quantity,
        };

        if let Some(existing) = self.lines.iter_mut().find(|l| l.same_item(&candidate)) {
            existing.quantity = check_quantity(existing.quantity.saturating_add(quantity))?;
            return Ok(existing.id);
        }
        let id = candidate.id;
        self.lines.push(candidate);
        Ok(id)
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] or
    /// [`CartError::QuantityOutOfRange`].
    pub fn set_quantity(&mut self, line_id: CartLineId, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove(line_id);
        }
        let quantity = check_quantity(quantity)?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or(CartError::LineNotFound)?;
        line.quantity = quantity;
        Ok(())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] if no line has this id.
    pub fn remove(&mut self, line_id: CartLineId) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.id != line_id);
        if self.lines.len() == before {
            return Err(CartError::LineNotFound);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Product ids referenced by the cart.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<_> = self.lines.iter().map(|l| l.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Claim ids referenced by the cart.
    #[must_use]
    pub fn claim_ids(&self) -> Vec<ClaimId> {
        let mut ids: Vec<_> = self.lines.iter().filter_map(|l| l.claim_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// A cart line with its current price resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
    #[serde(flatten)]
    pub line: CartLine,
    /// Title as the buyer sees it (claim override when present).
    pub title: String,
    pub image: Option<String>,
    pub seller_id: UserId,
    pub affiliate_id: Option<UserId>,
    /// What the buyer pays per unit.
    pub unit_price: Money,
    /// The seller's own sale price per unit.
    pub base_unit_price: Money,
    pub line_total: Money,
    /// Units currently in stock.
    pub available: u32,
}

/// A priced cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<PricedLine>,
    pub item_count: u32,
    pub subtotal: Money,
}

/// Price every line of a cart from current records.
///
/// Lines whose product no longer exists are dropped. A line whose claim was
/// released, or no longer marks the product up, falls back to the seller's
/// own price.
///
/// # Errors
///
/// Returns [`CartError::Money`] if a line total or the subtotal overflows.
pub fn price_cart(
    cart: &Cart,
    products: &HashMap<ProductId, Product>,
    claims: &HashMap<ClaimId, Claim>,
) -> Result<CartView, CartError> {
    let mut lines = Vec::with_capacity(cart.lines.len());
    for line in &cart.lines {
        let Some(product) = products.get(&line.product_id) else {
            continue;
        };
        let claim = line
            .claim_id
            .and_then(|id| claims.get(&id))
            .filter(|c| c.product_id == product.id && c.is_marked_up(product));

        let unit_price = claim.map_or(product.sale_price, |c| c.sale_price);
        let mut line = line.clone();
        if claim.is_none() {
            line.claim_id = None;
        }
        lines.push(PricedLine {
            title: claim
                .and_then(|c| c.title.clone())
                .unwrap_or_else(|| product.title.clone()),
            image: product.images.first().cloned(),
            seller_id: product.seller_id,
            affiliate_id: claim.map(|c| c.affiliate_id),
            unit_price,
            base_unit_price: product.sale_price,
            line_total: unit_price.times(line.quantity)?,
            available: product.stock,
            line,
        });
    }

    Ok(CartView {
        item_count: lines.iter().map(|l| l.line.quantity).sum(),
        subtotal: Money::total(lines.iter().map(|l| l.line_total))?,
        lines,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::catalog::tests::{draft, money};
    use crate::claim::ClaimDraft;

    fn tee() -> Product {
        let mut d = draft("Tee", "20");
        d.colors = vec!["Black".into(), "White".into()];
        d.sizes = vec!["M".into()];
        Product::create(
            ProductId::generate(),
            UserId::generate(),
            d.validate().unwrap(),
            Utc::now(),
        )
    }

    fn claim_for(product: &Product, price: &str) -> Claim {
        Claim::create(
            ClaimId::generate(),
            UserId::generate(),
            product,
            ClaimDraft {
                title: Some("Staff Pick Tee".into()),
                description: None,
                sale_price: money(price),
                regular_price: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_same_item_merges() {
        let p = tee();
        let mut cart = Cart::default();
        let a = cart.add(&p, None, Some("black"), Some("m"), 2).unwrap();
        let b = cart.add(&p, None, Some("Black"), Some("M"), 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 5);
        assert_eq!(cart.lines()[0].color.as_deref(), Some("Black"));
    }

    #[test]
    fn test_accented_variant_matches_any_case() {
        let mut d = draft("Tee", "20");
        d.colors = vec!["Écru".into()];
        let p = Product::create(
            ProductId::generate(),
            UserId::generate(),
            d.validate().unwrap(),
            Utc::now(),
        );
        let mut cart = Cart::default();
        cart.add(&p, None, Some("écru"), None, 1).unwrap();
        cart.add(&p, None, Some("ÉCRU"), None, 1).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].color.as_deref(), Some("Écru"));
    }

    #[test]
    fn test_different_variant_or_claim_is_new_line() {
        let p = tee();
        let c = claim_for(&p, "25");
        let mut cart = Cart::default();
        cart.add(&p, None, Some("Black"), Some("M"), 1).unwrap();
        cart.add(&p, None, Some("White"), Some("M"), 1).unwrap();
        cart.add(&p, Some(&c), Some("White"), Some("M"), 1).unwrap();
        assert_eq!(cart.lines().len(), 3);
    }

    #[test]
    fn test_variant_rules() {
        let p = tee();
        let mut cart = Cart::default();
        assert_eq!(
            cart.add(&p, None, None, Some("M"), 1),
            Err(CartError::VariantRequired("color"))
        );
        assert!(matches!(
            cart.add(&p, None, Some("Red"), Some("M"), 1),
            Err(CartError::UnknownVariant { kind: "color", .. })
        ));
    }

    #[test]
    fn test_quantity_bounds() {
        let p = tee();
        let mut cart = Cart::default();
        assert_eq!(
            cart.add(&p, None, Some("Black"), Some("M"), 0),
            Err(CartError::QuantityOutOfRange)
        );
        let id = cart.add(&p, None, Some("Black"), Some("M"), 99).unwrap();
        assert_eq!(
            cart.add(&p, None, Some("Black"), Some("M"), 1),
            Err(CartError::QuantityOutOfRange)
        );
        assert_eq!(cart.set_quantity(id, 100), Err(CartError::QuantityOutOfRange));
        cart.set_quantity(id, 0).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.remove(id), Err(CartError::LineNotFound));
    }

    #[test]
    fn test_claim_must_match_product() {
        let p = tee();
        let other = tee();
        let c = claim_for(&other, "25");
        let mut cart = Cart::default();
        assert_eq!(
            cart.add(&p, Some(&c), Some("Black"), Some("M"), 1),
            Err(CartError::ClaimMismatch)
        );
    }

    #[test]
    fn test_pricing_uses_current_records() {
        let p = tee();
        let c = claim_for(&p, "26.50");
        let mut cart = Cart::default();
        cart.add(&p, None, Some("Black"), Some("M"), 2).unwrap();
        cart.add(&p, Some(&c), Some("Black"), Some("M"), 1).unwrap();

        let products = HashMap::from([(p.id, p.clone())]);
        let claims = HashMap::from([(c.id, c.clone())]);
        let view = price_cart(&cart, &products, &claims).unwrap();
        assert_eq!(view.subtotal, money("66.50"));
        assert_eq!(view.item_count, 3);
        assert_eq!(view.lines[1].title, "Staff Pick Tee");
        assert_eq!(view.lines[1].affiliate_id, Some(c.affiliate_id));
        assert_eq!(view.lines[1].base_unit_price, money("20"));

        // Released claim falls back to the seller price.
        let view = price_cart(&cart, &products, &HashMap::new()).unwrap();
        assert_eq!(view.subtotal, money("60"));
        assert_eq!(view.lines[1].line.claim_id, None);

        // Deleted product disappears from the view.
        let view = price_cart(&cart, &HashMap::new(), &claims).unwrap();
        assert!(view.lines.is_empty());
        assert_eq!(view.subtotal, Money::ZERO);
    }

    #[test]
    fn test_subtotal_past_max_is_an_error() {
        let mut d = draft("Gold Tee", "600000000000");
        d.colors = vec!["Black".into(), "White".into()];
        let p = Product::create(
            ProductId::generate(),
            UserId::generate(),
            d.validate().unwrap(),
            Utc::now(),
        );
        let mut cart = Cart::default();
        cart.add(&p, None, Some("Black"), None, 1).unwrap();
        cart.add(&p, None, Some("White"), None, 1).unwrap();

        let products = HashMap::from([(p.id, p)]);
        assert!(matches!(
            price_cart(&cart, &products, &HashMap::new()),
            Err(CartError::Money(MoneyError::Overflow))
        ));
    }
}
