//! Session cart handlers.
//!
//! The cart itself only lists what the buyer wants; every response prices
//! it from current records.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tower_sessions::Session;

use marketplace_core::CartLineId;
use marketplace_core::cart::{Cart, CartView};

use crate::error::Result;
use crate::models::session_keys;
use crate::services::orders::AddToCart;
use crate::state::AppState;

/// New quantity for a cart line; zero removes it.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantity {
    pub quantity: u32,
}

pub(crate) async fn load_cart(session: &Session) -> Result<Cart> {
    Ok(session
        .get::<Cart>(session_keys::CART)
        .await?
        .unwrap_or_default())
}

pub(crate) async fn save_cart(session: &Session, cart: &Cart) -> Result<()> {
    session.insert(session_keys::CART, cart).await?;
    Ok(())
}

async fn priced(state: &AppState, cart: &Cart) -> Result<Json<CartView>> {
    Ok(Json(state.orders().price(cart).await?))
}

/// Show the priced cart.
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let cart = load_cart(&session).await?;
    priced(&state, &cart).await
}

/// Add a product (optionally through a storefront claim).
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<AddToCart>,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    state.orders().add_to_cart(&mut cart, req).await?;
    save_cart(&session, &cart).await?;
    priced(&state, &cart).await
}

/// Set a line's quantity.
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Path(line_id): Path<CartLineId>,
    Json(req): Json<UpdateQuantity>,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    cart.set_quantity(line_id, req.quantity)?;
    save_cart(&session, &cart).await?;
    priced(&state, &cart).await
}

/// Remove a line.
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Path(line_id): Path<CartLineId>,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    cart.remove(line_id)?;
    save_cart(&session, &cart).await?;
    priced(&state, &cart).await
}

/// Empty the cart.
pub async fn clear(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    cart.clear();
    save_cart(&session, &cart).await?;
    priced(&state, &cart).await
}
