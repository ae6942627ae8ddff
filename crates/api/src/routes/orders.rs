//! Checkout and order handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use marketplace_core::OrderId;
use marketplace_core::order::{Order, OrderStatus};

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::routes::cart::{load_cart, save_cart};
use crate::state::AppState;

/// Requested status change.
#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
}

/// Turn the session cart into an order and clear the cart.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
    RequireUser(user): RequireUser,
) -> Result<impl IntoResponse> {
    let mut cart = load_cart(&session).await?;
    let order = state.orders().checkout(user.id, &cart).await?;

    cart.clear();
    save_cart(&session, &cart).await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// The buyer's orders, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.store().orders_for_buyer(user.id).await?))
}

/// One order, if the user is part of it.
pub async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().visible_order(&user, id).await?))
}

/// Move an order along its status machine.
pub async fn update_status(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<OrderId>,
    Json(change): Json<StatusChange>,
) -> Result<Json<Order>> {
    Ok(Json(
        state
            .orders()
            .change_status(&user, id, change.status)
            .await?,
    ))
}
