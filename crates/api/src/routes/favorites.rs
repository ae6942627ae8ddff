//! Favorite products. Adding and removing are idempotent.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;

use marketplace_core::ProductId;
use marketplace_core::favorite::{Favorite, FavoriteState};
use marketplace_core::listing::{ListingQuery, Page};

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::routes::products::find_product;
use crate::services::catalog::ProductCard;
use crate::state::AppState;

/// The user's favorites as a listing.
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Page<ProductCard>>> {
    Ok(Json(state.catalog().favorites(user.id, &query).await?))
}

/// Mark a product as a favorite.
pub async fn add(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(product_id): Path<ProductId>,
) -> Result<Json<FavoriteState>> {
    find_product(&state, product_id).await?;
    state
        .store()
        .add_favorite(&Favorite {
            user_id: user.id,
            product_id,
            created_at: Utc::now(),
        })
        .await?;
    Ok(Json(FavoriteState {
        product_id,
        favorited: true,
    }))
}

/// Unmark a product. Succeeds even if it was not a favorite.
pub async fn remove(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(product_id): Path<ProductId>,
) -> Result<Json<FavoriteState>> {
    state
        .store()
        .remove_favorite(user.id, product_id)
        .await?;
    Ok(Json(FavoriteState {
        product_id,
        favorited: false,
    }))
}
