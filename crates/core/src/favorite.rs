//! Per-user favorite products.
//!
//! A favorite is just a (user, product) pair. Adding or removing one is
//! idempotent: the store treats a repeated add or a missing remove as a
//! no-op, so clients can retry freely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ProductId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Favorite {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub created_at: DateTime<Utc>,
}

/// Result of a favorite toggle, reported back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FavoriteState {
    pub product_id: ProductId,
    pub favorited: bool,
}
