//! Public affiliate storefronts.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Serialize;

use marketplace_core::UserId;
use marketplace_core::listing::{ListingQuery, Page};

use crate::error::{AppError, Result};
use crate::services::catalog::ProductCard;
use crate::state::AppState;

/// Public view of the storefront owner.
#[derive(Debug, Serialize)]
pub struct StorefrontOwner {
    pub id: UserId,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct Storefront {
    pub affiliate: StorefrontOwner,
    #[serde(flatten)]
    pub page: Page<ProductCard>,
}

/// An affiliate's claimed products at their prices.
pub async fn show(
    State(state): State<AppState>,
    Path(affiliate_id): Path<UserId>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Storefront>> {
    let owner = state
        .store()
        .user(affiliate_id)
        .await?
        .filter(|u| u.role.can_claim())
        .ok_or_else(|| AppError::NotFound("storefront not found".to_string()))?;

    let page = state.catalog().storefront(affiliate_id, &query).await?;
    Ok(Json(Storefront {
        affiliate: StorefrontOwner {
            id: owner.id,
            display_name: owner.display_name,
        },
        page,
    }))
}
