//! Seller dashboard handlers.

use axum::{
    Json,
    extract::{Query, State},
};

use marketplace_core::listing::{ListingQuery, Page};
use marketplace_core::order::Order;

use crate::error::Result;
use crate::middleware::RequireSeller;
use crate::services::catalog::ProductCard;
use crate::state::AppState;

/// The seller's own products, with the usual listing parameters.
pub async fn products(
    State(state): State<AppState>,
    RequireSeller(seller): RequireSeller,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Page<ProductCard>>> {
    Ok(Json(
        state.catalog().seller_products(seller.id, &query).await?,
    ))
}

/// Orders containing at least one of the seller's products.
pub async fn orders(
    State(state): State<AppState>,
    RequireSeller(seller): RequireSeller,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.store().orders_for_seller(seller.id).await?))
}
