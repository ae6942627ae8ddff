//! Persistence for the marketplace.
//!
//! Every handler talks to storage through the [`MarketplaceStore`] trait.
//! Two backends implement it:
//!
//! - [`PgStore`] - `PostgreSQL` via sqlx (production)
//! - [`MemoryStore`] - process-local maps (tests, demos)
//!
//! # Tables
//!
//! - `users` - Accounts and password hashes
//! - `tower_sessions.session` - Tower-sessions storage
//! - `products` - Seller products
//! - `claims` - Affiliate overrides, unique per (affiliate, product)
//! - `favorites` - (user, product) pairs
//! - `reviews` - Ratings, unique per (author, product)
//! - `orders` / `order_items` - Placed orders with price snapshots
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p marketplace-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use marketplace_core::catalog::Product;
use marketplace_core::claim::Claim;
use marketplace_core::favorite::Favorite;
use marketplace_core::order::{Order, OrderStatus};
use marketplace_core::review::{RatingSummary, Review};
use marketplace_core::{ClaimId, Email, OrderId, ProductId, UserId};

use crate::models::User;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email, duplicate claim).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Not enough stock to reserve for an order.
    #[error("only {available} of product {product_id} left in stock")]
    OutOfStock {
        product_id: ProductId,
        available: u32,
    },
}

/// A status write whose starting point no longer matches the stored order.
fn status_conflict(stored: OrderStatus, next: OrderStatus) -> RepositoryError {
    RepositoryError::Conflict(format!(
        "order is already {stored} and cannot move to {next}"
    ))
}

/// Storage operations used by the API.
///
/// Writes that must be atomic (placing an order, unique claims) are atomic
/// inside a single call; callers never need their own transaction.
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    // Users

    /// Insert a user. `Conflict` if the email is taken.
    async fn create_user(&self, user: &User, password_hash: &str) -> Result<(), RepositoryError>;
    async fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    /// Look up a user and their password hash for login.
    async fn user_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;
    /// Persist profile fields. `NotFound` if the user is gone.
    async fn update_user(&self, user: &User) -> Result<(), RepositoryError>;

    // Products

    /// Every product, newest first.
    async fn products(&self) -> Result<Vec<Product>, RepositoryError>;
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn insert_product(&self, product: &Product) -> Result<(), RepositoryError>;
    /// Replace a product's editable fields. `NotFound` if it is gone.
    async fn update_product(&self, product: &Product) -> Result<(), RepositoryError>;
    /// Delete a product with its claims, favorites and reviews.
    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError>;

    // Claims

    /// Insert a claim. `Conflict` if the affiliate already claimed the product.
    async fn insert_claim(&self, claim: &Claim) -> Result<(), RepositoryError>;
    async fn claim(&self, id: ClaimId) -> Result<Option<Claim>, RepositoryError>;
    async fn claims_by_ids(&self, ids: &[ClaimId]) -> Result<Vec<Claim>, RepositoryError>;
    /// An affiliate's claims, newest first.
    async fn claims_by_affiliate(&self, affiliate_id: UserId)
    -> Result<Vec<Claim>, RepositoryError>;
    async fn update_claim(&self, claim: &Claim) -> Result<(), RepositoryError>;
    async fn delete_claim(&self, id: ClaimId) -> Result<(), RepositoryError>;

    // Favorites

    /// Add a favorite. Adding an existing favorite is a no-op.
    async fn add_favorite(&self, favorite: &Favorite) -> Result<(), RepositoryError>;
    /// Remove a favorite. Removing a missing favorite is a no-op.
    async fn remove_favorite(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<(), RepositoryError>;
    async fn favorite_product_ids(&self, user_id: UserId)
    -> Result<Vec<ProductId>, RepositoryError>;

    // Reviews

    /// Insert a review. `Conflict` if the author already reviewed the product.
    async fn insert_review(&self, review: &Review) -> Result<(), RepositoryError>;
    /// A product's reviews, newest first.
    async fn reviews_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Review>, RepositoryError>;
    /// Rating summaries for every reviewed product.
    async fn rating_summaries(&self) -> Result<HashMap<ProductId, RatingSummary>, RepositoryError>;

    // Orders

    /// Store a new order, reserving stock and counting sales for every item.
    /// `OutOfStock` (and nothing written) if any product is short.
    async fn place_order(&self, order: &Order) -> Result<(), RepositoryError>;
    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;
    /// Orders newest first.
    async fn orders_for_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, RepositoryError>;
    async fn orders_for_seller(&self, seller_id: UserId) -> Result<Vec<Order>, RepositoryError>;
    async fn orders_for_affiliate(
        &self,
        affiliate_id: UserId,
    ) -> Result<Vec<Order>, RepositoryError>;
    /// Persist a status change. Moving to `cancelled` returns reserved
    /// stock and takes back the counted sales.
    ///
    /// The move is checked against the stored status, so a writer holding a
    /// stale copy of the order gets `Conflict` instead of overwriting.
    async fn update_order_status(&self, order: &Order) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
