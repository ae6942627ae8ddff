//! Affiliate handlers: claimable products, claims and commission.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use marketplace_core::claim::{Claim, ClaimDraft};
use marketplace_core::listing::{ListingQuery, Page};
use marketplace_core::{ClaimId, Money, ProductId, UserRole};

use crate::error::{AppError, Result};
use crate::middleware::RequireAffiliate;
use crate::models::CurrentUser;
use crate::routes::products::find_product;
use crate::services::catalog::ProductCard;
use crate::services::orders::AffiliateOrder;
use crate::state::AppState;

/// Claim request: the product plus override fields.
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub sale_price: Money,
    #[serde(default)]
    pub regular_price: Option<Money>,
}

impl ClaimRequest {
    fn into_draft(self) -> (ProductId, ClaimDraft) {
        (
            self.product_id,
            ClaimDraft {
                title: self.title,
                description: self.description,
                sale_price: self.sale_price,
                regular_price: self.regular_price,
            },
        )
    }
}

async fn owned_claim(state: &AppState, user: &CurrentUser, id: ClaimId) -> Result<Claim> {
    let claim = state
        .store()
        .claim(id)
        .await?
        .ok_or_else(|| AppError::NotFound("claim not found".to_string()))?;
    if claim.affiliate_id != user.id && user.role != UserRole::Admin {
        return Err(AppError::Forbidden(
            "only the affiliate can change this claim".to_string(),
        ));
    }
    Ok(claim)
}

/// Products the affiliate can still claim.
pub async fn available_products(
    State(state): State<AppState>,
    RequireAffiliate(affiliate): RequireAffiliate,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Page<ProductCard>>> {
    Ok(Json(state.catalog().claimable(affiliate.id, &query).await?))
}

/// The affiliate's claims, newest first.
pub async fn claims(
    State(state): State<AppState>,
    RequireAffiliate(affiliate): RequireAffiliate,
) -> Result<Json<Vec<Claim>>> {
    Ok(Json(state.store().claims_by_affiliate(affiliate.id).await?))
}

/// Claim a product at a markup.
#[instrument(skip(state, affiliate, req), fields(affiliate_id = %affiliate.id))]
pub async fn create_claim(
    State(state): State<AppState>,
    RequireAffiliate(affiliate): RequireAffiliate,
    Json(req): Json<ClaimRequest>,
) -> Result<impl IntoResponse> {
    let (product_id, draft) = req.into_draft();
    let product = find_product(&state, product_id).await?;

    let claim = Claim::create(ClaimId::generate(), affiliate.id, &product, draft, Utc::now())?;
    state.store().insert_claim(&claim).await?;
    state.catalog_cache().invalidate();

    tracing::info!(claim_id = %claim.id, product_id = %product_id, "product claimed");
    Ok((StatusCode::CREATED, Json(claim)))
}

/// Change a claim's override. The markup rule is checked against the
/// product's current price.
#[instrument(skip(state, affiliate, draft), fields(affiliate_id = %affiliate.id))]
pub async fn update_claim(
    State(state): State<AppState>,
    RequireAffiliate(affiliate): RequireAffiliate,
    Path(id): Path<ClaimId>,
    Json(draft): Json<ClaimDraft>,
) -> Result<Json<Claim>> {
    let mut claim = owned_claim(&state, &affiliate, id).await?;
    let product = find_product(&state, claim.product_id).await?;

    claim.revise(&product, draft, Utc::now())?;
    state.store().update_claim(&claim).await?;
    state.catalog_cache().invalidate();
    Ok(Json(claim))
}

/// Release a claim.
#[instrument(skip(state, affiliate), fields(affiliate_id = %affiliate.id))]
pub async fn release_claim(
    State(state): State<AppState>,
    RequireAffiliate(affiliate): RequireAffiliate,
    Path(id): Path<ClaimId>,
) -> Result<StatusCode> {
    owned_claim(&state, &affiliate, id).await?;
    state.store().delete_claim(id).await?;
    state.catalog_cache().invalidate();
    Ok(StatusCode::NO_CONTENT)
}

/// Orders sold through the affiliate's claims, with commission earned.
pub async fn orders(
    State(state): State<AppState>,
    RequireAffiliate(affiliate): RequireAffiliate,
) -> Result<Json<Vec<AffiliateOrder>>> {
    Ok(Json(state.orders().affiliate_orders(affiliate.id).await?))
}
