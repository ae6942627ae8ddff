//! Catalog and review handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use marketplace_core::catalog::{Product, ProductDraft};
use marketplace_core::listing::{Listing, ListingQuery, Page};
use marketplace_core::review::{RatingSummary, Review, ReviewDraft, summarize};
use marketplace_core::{ProductId, ReviewId, UserRole};

use crate::error::{AppError, Result};
use crate::middleware::{RequireSeller, RequireUser};
use crate::models::CurrentUser;
use crate::services::catalog::ProductCard;
use crate::state::AppState;

/// Reviews of one product with their summary.
#[derive(Debug, Serialize)]
pub struct ProductReviews {
    pub rating: RatingSummary,
    pub reviews: Vec<Review>,
}

pub(crate) async fn find_product(state: &AppState, id: ProductId) -> Result<Product> {
    state
        .store()
        .product(id)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_string()))
}

/// Load a product the user may edit: their own, or any for admins.
async fn owned_product(state: &AppState, user: &CurrentUser, id: ProductId) -> Result<Product> {
    let product = find_product(state, id).await?;
    if product.seller_id != user.id && user.role != UserRole::Admin {
        return Err(AppError::Forbidden(
            "only the seller can change this product".to_string(),
        ));
    }
    Ok(product)
}

/// Public catalog listing.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Page<ProductCard>>> {
    Ok(Json(state.catalog().catalog(&query).await?))
}

/// Product detail with rating summary.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductCard>> {
    let product = find_product(&state, id).await?;
    let rating = state.catalog().rating(id).await?;
    Ok(Json(ProductCard {
        listing: Listing::direct(product),
        rating,
    }))
}

/// Create a product owned by the current seller.
#[instrument(skip(state, seller, draft), fields(seller_id = %seller.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireSeller(seller): RequireSeller,
    Json(draft): Json<ProductDraft>,
) -> Result<impl IntoResponse> {
    let product = Product::create(ProductId::generate(), seller.id, draft.validate()?, Utc::now());
    state.store().insert_product(&product).await?;
    state.catalog_cache().invalidate();

    tracing::info!(product_id = %product.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// Replace a product's editable fields.
#[instrument(skip(state, user, draft), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<ProductId>,
    Json(draft): Json<ProductDraft>,
) -> Result<Json<Product>> {
    let mut product = owned_product(&state, &user, id).await?;
    product.revise(draft.validate()?, Utc::now());
    state.store().update_product(&product).await?;
    state.catalog_cache().invalidate();
    Ok(Json(product))
}

/// Delete a product with its claims, favorites and reviews.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn destroy(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    owned_product(&state, &user, id).await?;
    state.store().delete_product(id).await?;
    state.catalog_cache().invalidate();

    tracing::info!(product_id = %id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// A product's reviews, newest first.
pub async fn reviews(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductReviews>> {
    find_product(&state, id).await?;
    let reviews = state.store().reviews_for_product(id).await?;
    Ok(Json(ProductReviews {
        rating: summarize(reviews.iter().map(|r| &r.rating)),
        reviews,
    }))
}

/// Review a product. One review per user and product.
#[instrument(skip(state, user, draft), fields(user_id = %user.id))]
pub async fn add_review(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<ProductId>,
    Json(draft): Json<ReviewDraft>,
) -> Result<impl IntoResponse> {
    let product = find_product(&state, id).await?;
    if product.seller_id == user.id {
        return Err(AppError::Forbidden(
            "you cannot review your own product".to_string(),
        ));
    }

    let review = Review::create(
        ReviewId::generate(),
        id,
        user.id,
        user.display_name.clone(),
        draft,
        Utc::now(),
    )?;
    state.store().insert_review(&review).await?;
    state.catalog_cache().invalidate();

    Ok((StatusCode::CREATED, Json(review)))
}
