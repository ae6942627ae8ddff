//! Seed the marketplace with users and their products from a JSON file.
//!
//! ```json
//! {
//!   "users": [
//!     {
//!       "email": "seller@example.com",
//!       "password": "change me please",
//!       "display_name": "Sample Seller",
//!       "role": "seller",
//!       "products": [
//!         { "title": "Linen Shirt", "category": "Tops", "regular_price": "30.00",
//!           "stock": 10, "colors": ["White"], "sizes": ["M", "L"] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Users whose email already exists are skipped together with their
//! products, so running the same file twice does not duplicate anything.
//! Unlike self-service registration, seed users may be admins.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use marketplace_api::db::{self, MarketplaceStore, PgStore, RepositoryError};
use marketplace_api::models::User;
use marketplace_api::models::user::normalize_display_name;
use marketplace_api::services::auth::{self, AuthError};
use marketplace_core::catalog::{Product, ProductDraft, ProductError, ValidDraft};
use marketplace_core::{Email, EmailError, ProductId, UserId, UserRole};

use super::migrate::{MigrationError, database_url};

/// A seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub users: Vec<SeedUser>,
}

/// One account to create, with the products it sells.
#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub products: Vec<ProductDraft>,
}

/// What a seed run did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users_created: usize,
    pub users_skipped: usize,
    pub products_created: usize,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Could not read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{email}: {source}")]
    InvalidEmail { email: String, source: EmailError },

    #[error("{email}: {message}")]
    InvalidUser { email: String, message: String },

    #[error("{email}: only sellers and admins can own products")]
    NotASeller { email: String },

    #[error("{email}: product '{title}': {source}")]
    InvalidProduct {
        email: String,
        title: String,
        source: ProductError,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Setup(#[from] MigrationError),
}

/// Load a seed file and apply it to the configured database.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, or a database
/// write fails.
pub async fn run(file_path: &str) -> Result<SeedSummary, SeedError> {
    let path = Path::new(file_path);
    tracing::info!(path = %path.display(), "Loading seed file");
    let content = tokio::fs::read_to_string(path).await?;
    let seed: SeedFile = serde_json::from_str(&content)?;

    let database_url = database_url()?;
    let pool = db::create_pool(&database_url)
        .await
        .map_err(MigrationError::from)?;
    let store = PgStore::new(pool);

    apply(&store, seed).await
}

/// Apply a parsed seed file to a store.
///
/// Every entry is validated before anything is written.
///
/// # Errors
///
/// Returns the first validation failure, or a store error.
pub async fn apply(store: &dyn MarketplaceStore, seed: SeedFile) -> Result<SeedSummary, SeedError> {
    let now = Utc::now();
    let mut prepared = Vec::with_capacity(seed.users.len());
    for entry in seed.users {
        prepared.push(prepare(entry, now)?);
    }

    let mut summary = SeedSummary::default();
    for (user, password, drafts) in prepared {
        if store.user_credentials(&user.email).await?.is_some() {
            tracing::info!(email = %user.email, "User exists, skipping");
            summary.users_skipped += 1;
            continue;
        }

        let hash = auth::hash_password(&password)?;
        store.create_user(&user, &hash).await?;
        summary.users_created += 1;

        for draft in drafts {
            let product = Product::create(ProductId::generate(), user.id, draft, now);
            store.insert_product(&product).await?;
            summary.products_created += 1;
        }
        tracing::info!(email = %user.email, role = %user.role, "User seeded");
    }

    Ok(summary)
}

type Prepared = (User, String, Vec<ValidDraft>);

fn prepare(entry: SeedUser, now: DateTime<Utc>) -> Result<Prepared, SeedError> {
    let email = Email::parse(&entry.email).map_err(|source| SeedError::InvalidEmail {
        email: entry.email.clone(),
        source,
    })?;
    let invalid = |message: String| SeedError::InvalidUser {
        email: entry.email.clone(),
        message,
    };
    auth::validate_password(&entry.password).map_err(|e| invalid(e.to_string()))?;
    let display_name =
        normalize_display_name(&entry.display_name).map_err(|e| invalid(e.to_string()))?;

    if !entry.products.is_empty() && !entry.role.can_sell() {
        return Err(SeedError::NotASeller { email: entry.email });
    }

    let mut drafts = Vec::with_capacity(entry.products.len());
    for draft in entry.products {
        let title = draft.title.clone();
        drafts.push(draft.validate().map_err(|source| SeedError::InvalidProduct {
            email: entry.email.clone(),
            title,
            source,
        })?);
    }

    let user = User {
        id: UserId::generate(),
        email,
        display_name,
        role: entry.role,
        phone: None,
        address: None,
        created_at: now,
        updated_at: now,
    };
    Ok((user, entry.password, drafts))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use marketplace_api::db::MemoryStore;

    const DEMO: &str = include_str!("../../../../demos/seed.json");

    #[tokio::test]
    async fn test_demo_file_seeds_once() {
        let store = MemoryStore::new();

        let seed: SeedFile = serde_json::from_str(DEMO).unwrap();
        let users = seed.users.len();
        let first = apply(&store, seed).await.unwrap();
        assert_eq!(first.users_created, users);
        assert!(first.products_created > 0);
        assert_eq!(store.products().await.unwrap().len(), first.products_created);

        let again = apply(&store, serde_json::from_str(DEMO).unwrap())
            .await
            .unwrap();
        assert_eq!(again.users_created, 0);
        assert_eq!(again.users_skipped, users);
        assert_eq!(again.products_created, 0);
    }

    #[tokio::test]
    async fn test_invalid_entry_writes_nothing() {
        let store = MemoryStore::new();
        let seed: SeedFile = serde_json::from_value(serde_json::json!({
            "users": [
                { "email": "ok@example.com", "password": "long enough password",
                  "display_name": "Ok" },
                { "email": "buyer@example.com", "password": "long enough password",
                  "display_name": "Buyer", "role": "customer",
                  "products": [{ "title": "Tee", "category": "Tops", "regular_price": "5" }] }
            ]
        }))
        .unwrap();

        assert!(matches!(
            apply(&store, seed).await,
            Err(SeedError::NotASeller { .. })
        ));
        let ok = Email::parse("ok@example.com").unwrap();
        assert!(store.user_credentials(&ok).await.unwrap().is_none());
    }
}
