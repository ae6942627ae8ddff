//! Cart pricing, checkout and order management.
//!
//! Carts are priced from fresh store reads, never from the catalog cache, so
//! checkout sees current prices, claims and stock.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use marketplace_core::cart::{Cart, CartView, price_cart};
use marketplace_core::order::{Order, OrderActor, OrderStatus};
use marketplace_core::{ClaimId, Money, OrderId, ProductId, UserId, UserRole};

use crate::db::MarketplaceStore;
use crate::error::{AppError, Result};
use crate::models::CurrentUser;
use crate::services::catalog::CatalogCache;

/// Request to add a product to the cart.
#[derive(Debug, Clone, Deserialize)]
pub struct AddToCart {
    pub product_id: ProductId,
    /// Set when adding from an affiliate storefront.
    #[serde(default)]
    pub claim_id: Option<ClaimId>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

/// An order seen by an affiliate, with what they earned on it.
#[derive(Debug, Clone, Serialize)]
pub struct AffiliateOrder {
    #[serde(flatten)]
    pub order: Order,
    pub commission: Money,
}

/// Cart and order operations over a store.
pub struct OrderService<'a> {
    store: &'a dyn MarketplaceStore,
    cache: &'a CatalogCache,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn MarketplaceStore, cache: &'a CatalogCache) -> Self {
        Self { store, cache }
    }

    /// Add a line to `cart`, validating the product, claim and variant.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing product or claim, `BadRequest`/`Conflict`
    /// for cart rule violations.
    #[instrument(skip(self, cart, req), fields(product_id = %req.product_id))]
    pub async fn add_to_cart(&self, cart: &mut Cart, req: AddToCart) -> Result<()> {
        let product = self
            .store
            .product(req.product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("product not found".to_string()))?;

        let claim = match req.claim_id {
            Some(id) => Some(
                self.store
                    .claim(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("claim not found".to_string()))?,
            ),
            None => None,
        };

        cart.add(
            &product,
            claim.as_ref(),
            req.color.as_deref(),
            req.size.as_deref(),
            req.quantity,
        )?;
        Ok(())
    }

    /// Price a cart from current product and claim records.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails or a total overflows.
    pub async fn price(&self, cart: &Cart) -> Result<CartView> {
        let mut products = HashMap::new();
        for id in cart.product_ids() {
            if let Some(product) = self.store.product(id).await? {
                products.insert(id, product);
            }
        }
        let claims = self
            .store
            .claims_by_ids(&cart.claim_ids())
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(price_cart(cart, &products, &claims)?)
    }

    /// Turn a cart into a pending order, reserving stock.
    ///
    /// # Errors
    ///
    /// `BadRequest` for an empty cart, `Conflict` when stock is short.
    #[instrument(skip(self, cart), fields(buyer_id = %buyer_id))]
    pub async fn checkout(&self, buyer_id: UserId, cart: &Cart) -> Result<Order> {
        let view = self.price(cart).await?;
        let order = Order::place(OrderId::generate(), buyer_id, &view, Utc::now())?;

        self.store.place_order(&order).await?;
        self.cache.invalidate();

        tracing::info!(order_id = %order.id, total = %order.total, "order placed");
        Ok(order)
    }

    /// Load an order the user may see: buyer, seller or affiliate on one of
    /// its lines, or admin. Other users get `NotFound`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the order is missing or not visible to `user`.
    pub async fn visible_order(&self, user: &CurrentUser, id: OrderId) -> Result<Order> {
        let order = self
            .store
            .order(id)
            .await?
            .filter(|o| {
                user.role == UserRole::Admin
                    || o.buyer_id == user.id
                    || o.involves_seller(user.id)
                    || o.involves_affiliate(user.id)
            })
            .ok_or_else(|| AppError::NotFound("order not found".to_string()))?;
        Ok(order)
    }

    /// Move an order to `next` on behalf of `user`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has no part in the order, `Forbidden` or
    /// `Conflict` if the status machine rejects the move.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn change_status(
        &self,
        user: &CurrentUser,
        id: OrderId,
        next: OrderStatus,
    ) -> Result<Order> {
        let mut order = self.visible_order(user, id).await?;

        let actor = if user.role == UserRole::Admin {
            OrderActor::Admin
        } else if order.involves_seller(user.id) {
            OrderActor::Seller
        } else if order.buyer_id == user.id {
            OrderActor::Buyer
        } else {
            return Err(AppError::Forbidden(
                "only the buyer, a seller or an admin can change this order".to_string(),
            ));
        };

        order.transition(next, actor, Utc::now())?;
        self.store.update_order_status(&order).await?;
        if next == OrderStatus::Cancelled {
            self.cache.invalidate();
        }

        tracing::info!(order_id = %order.id, status = %order.status, "order status changed");
        Ok(order)
    }

    /// Orders that went through an affiliate's claims, with commission.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn affiliate_orders(&self, affiliate_id: UserId) -> Result<Vec<AffiliateOrder>> {
        Ok(self
            .store
            .orders_for_affiliate(affiliate_id)
            .await?
            .into_iter()
            .map(|order| AffiliateOrder {
                commission: order.commission_for(affiliate_id),
                order,
            })
            .collect())
    }
}
