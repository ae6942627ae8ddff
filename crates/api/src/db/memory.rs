//! In-memory store.
//!
//! All tables sit behind one `RwLock`, so every trait call is atomic with
//! respect to every other. Data lives as long as the process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use marketplace_core::catalog::Product;
use marketplace_core::claim::Claim;
use marketplace_core::favorite::Favorite;
use marketplace_core::order::{Order, OrderStatus, stock_demand};
use marketplace_core::review::{Rating, RatingSummary, Review, summarize};
use marketplace_core::{ClaimId, Email, OrderId, ProductId, ReviewId, UserId};

use super::{MarketplaceStore, RepositoryError, status_conflict};
use crate::models::User;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, (User, String)>,
    products: HashMap<ProductId, Product>,
    claims: HashMap<ClaimId, Claim>,
    favorites: HashMap<(UserId, ProductId), Favorite>,
    reviews: HashMap<ReviewId, Review>,
    orders: HashMap<OrderId, Order>,
}

/// Process-local [`MarketplaceStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_orders<'a>(orders: impl Iterator<Item = &'a Order>) -> Vec<Order> {
    let mut out: Vec<Order> = orders.cloned().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    out
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn create_user(&self, user: &User, password_hash: &str) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|(u, _)| u.email == user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        t.users
            .insert(user.id, (user.clone(), password_hash.to_owned()));
        Ok(())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let t = self.tables.read().await;
        Ok(t.users.get(&id).map(|(u, _)| u.clone()))
    }

    async fn user_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|(u, _)| &u.email == email).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        let (stored, _) = t.users.get_mut(&user.id).ok_or(RepositoryError::NotFound)?;
        stored.display_name.clone_from(&user.display_name);
        stored.phone.clone_from(&user.phone);
        stored.address.clone_from(&user.address);
        stored.updated_at = user.updated_at;
        Ok(())
    }

    async fn products(&self) -> Result<Vec<Product>, RepositoryError> {
        let t = self.tables.read().await;
        let mut out: Vec<Product> = t.products.values().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn insert_product(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        if t.products.contains_key(&product.id) {
            return Err(RepositoryError::Conflict("product already exists".to_owned()));
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        let stored = t
            .products
            .get_mut(&product.id)
            .ok_or(RepositoryError::NotFound)?;
        // Sales are owned by checkout; keep whatever is stored.
        let sales = stored.sales;
        *stored = product.clone();
        stored.sales = sales;
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        t.products.remove(&id).ok_or(RepositoryError::NotFound)?;
        t.claims.retain(|_, c| c.product_id != id);
        t.favorites.retain(|(_, product_id), _| *product_id != id);
        t.reviews.retain(|_, r| r.product_id != id);
        Ok(())
    }

    async fn insert_claim(&self, claim: &Claim) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        if !t.products.contains_key(&claim.product_id) {
            return Err(RepositoryError::NotFound);
        }
        if t.claims.values().any(|c| {
            c.affiliate_id == claim.affiliate_id && c.product_id == claim.product_id
        }) {
            return Err(RepositoryError::Conflict(
                "you have already claimed this product".to_owned(),
            ));
        }
        t.claims.insert(claim.id, claim.clone());
        Ok(())
    }

    async fn claim(&self, id: ClaimId) -> Result<Option<Claim>, RepositoryError> {
        Ok(self.tables.read().await.claims.get(&id).cloned())
    }

    async fn claims_by_ids(&self, ids: &[ClaimId]) -> Result<Vec<Claim>, RepositoryError> {
        let t = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| t.claims.get(id).cloned()).collect())
    }

    async fn claims_by_affiliate(
        &self,
        affiliate_id: UserId,
    ) -> Result<Vec<Claim>, RepositoryError> {
        let t = self.tables.read().await;
        let mut out: Vec<Claim> = t
            .claims
            .values()
            .filter(|c| c.affiliate_id == affiliate_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn update_claim(&self, claim: &Claim) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        let stored = t.claims.get_mut(&claim.id).ok_or(RepositoryError::NotFound)?;
        *stored = claim.clone();
        Ok(())
    }

    async fn delete_claim(&self, id: ClaimId) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        t.claims.remove(&id).ok_or(RepositoryError::NotFound)?;
        Ok(())
    }

    async fn add_favorite(&self, favorite: &Favorite) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        if !t.products.contains_key(&favorite.product_id) {
            return Err(RepositoryError::NotFound);
        }
        t.favorites
            .entry((favorite.user_id, favorite.product_id))
            .or_insert(*favorite);
        Ok(())
    }

    async fn remove_favorite(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<(), RepositoryError> {
        self.tables
            .write()
            .await
            .favorites
            .remove(&(user_id, product_id));
        Ok(())
    }

    async fn favorite_product_ids(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ProductId>, RepositoryError> {
        let t = self.tables.read().await;
        let mut favorites: Vec<&Favorite> = t
            .favorites
            .values()
            .filter(|f| f.user_id == user_id)
            .collect();
        favorites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(favorites.into_iter().map(|f| f.product_id).collect())
    }

    async fn insert_review(&self, review: &Review) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        if !t.products.contains_key(&review.product_id) {
            return Err(RepositoryError::NotFound);
        }
        if t.reviews.values().any(|r| {
            r.author_id == review.author_id && r.product_id == review.product_id
        }) {
            return Err(RepositoryError::Conflict(
                "you have already reviewed this product".to_owned(),
            ));
        }
        t.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn reviews_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Review>, RepositoryError> {
        let t = self.tables.read().await;
        let mut out: Vec<Review> = t
            .reviews
            .values()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn rating_summaries(
        &self,
    ) -> Result<HashMap<ProductId, RatingSummary>, RepositoryError> {
        let t = self.tables.read().await;
        let mut by_product: HashMap<ProductId, Vec<Rating>> = HashMap::new();
        for review in t.reviews.values() {
            by_product
                .entry(review.product_id)
                .or_default()
                .push(review.rating);
        }
        Ok(by_product
            .into_iter()
            .map(|(id, ratings)| (id, summarize(&ratings)))
            .collect())
    }

    async fn place_order(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        let demand = stock_demand(&order.items);

        for (product_id, requested) in &demand {
            let available = t.products.get(product_id).map_or(0, |p| p.stock);
            if available < *requested {
                return Err(RepositoryError::OutOfStock {
                    product_id: *product_id,
                    available,
                });
            }
        }
        for (product_id, requested) in demand {
            if let Some(product) = t.products.get_mut(&product_id) {
                product.stock -= requested;
                product.sales = product.sales.saturating_add(requested);
            }
        }
        t.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn orders_for_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let t = self.tables.read().await;
        Ok(newest_orders(
            t.orders.values().filter(|o| o.buyer_id == buyer_id),
        ))
    }

    async fn orders_for_seller(&self, seller_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let t = self.tables.read().await;
        Ok(newest_orders(
            t.orders.values().filter(|o| o.involves_seller(seller_id)),
        ))
    }

    async fn orders_for_affiliate(
        &self,
        affiliate_id: UserId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let t = self.tables.read().await;
        Ok(newest_orders(
            t.orders
                .values()
                .filter(|o| o.involves_affiliate(affiliate_id)),
        ))
    }

    async fn update_order_status(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        let previous = t
            .orders
            .get(&order.id)
            .map(|o| o.status)
            .ok_or(RepositoryError::NotFound)?;
        if !previous.can_transition_to(order.status) {
            return Err(status_conflict(previous, order.status));
        }

        if order.status == OrderStatus::Cancelled {
            for (product_id, quantity) in stock_demand(&order.items) {
                if let Some(product) = t.products.get_mut(&product_id) {
                    product.stock = product.stock.saturating_add(quantity);
                    product.sales = product.sales.saturating_sub(quantity);
                }
            }
        }
        if let Some(stored) = t.orders.get_mut(&order.id) {
            stored.status = order.status;
            stored.updated_at = order.updated_at;
        }
        Ok(())
    }
}
