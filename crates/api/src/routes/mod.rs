//! HTTP route handlers for the marketplace API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                              - Liveness
//! GET    /health/ready                        - Readiness (store ping)
//!
//! # Auth (strict rate limit)
//! POST   /api/auth/register                   - Create account, start session
//! POST   /api/auth/login                      - Start session
//! POST   /api/auth/logout                     - End session
//! GET    /api/auth/me                         - Current user
//!
//! # Account
//! GET    /api/account/profile                 - Profile
//! PUT    /api/account/profile                 - Update profile
//!
//! # Catalog
//! GET    /api/products                        - Listing (filter/sort/page)
//! POST   /api/products                        - Create (seller)
//! GET    /api/products/{id}                   - Detail with rating summary
//! PUT    /api/products/{id}                   - Update (owner/admin)
//! DELETE /api/products/{id}                   - Delete (owner/admin)
//! GET    /api/products/{id}/reviews           - Reviews
//! POST   /api/products/{id}/reviews           - Add review
//! GET    /api/seller/products                 - Own products
//! GET    /api/seller/orders                   - Orders containing own items
//!
//! # Affiliates
//! GET    /api/affiliate/available-products    - Claimable products
//! GET    /api/affiliate/claims                - Own claims
//! POST   /api/affiliate/claims                - Claim a product
//! PUT    /api/affiliate/claims/{id}           - Update override
//! DELETE /api/affiliate/claims/{id}           - Release claim
//! GET    /api/affiliate/orders                - Orders with commission
//! GET    /api/storefronts/{affiliate_id}      - Public storefront
//!
//! # Favorites
//! GET    /api/favorites                       - Listing
//! PUT    /api/favorites/{product_id}          - Add (idempotent)
//! DELETE /api/favorites/{product_id}          - Remove (idempotent)
//!
//! # Cart (session)
//! GET    /api/cart                            - Priced cart
//! POST   /api/cart/items                      - Add line
//! PATCH  /api/cart/items/{line_id}            - Set quantity
//! DELETE /api/cart/items/{line_id}            - Remove line
//! DELETE /api/cart                            - Clear
//!
//! # Orders
//! POST   /api/orders                          - Checkout
//! GET    /api/orders                          - Own orders
//! GET    /api/orders/{id}                     - Detail
//! PATCH  /api/orders/{id}/status              - Change status
//!
//! # Media
//! POST   /api/media/signature                 - Signed upload parameters
//! ```

pub mod account;
pub mod affiliate;
pub mod auth;
pub mod cart;
pub mod favorites;
pub mod health;
pub mod media;
pub mod orders;
pub mod products;
pub mod seller;
pub mod storefronts;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::SessionStore;
use tracing::Span;

use crate::middleware::{
    api_rate_limiter, auth_rate_limiter, create_session_layer, request_id_middleware,
    security_headers_middleware,
};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::destroy),
        )
        .route(
            "/{id}/reviews",
            get(products::reviews).post(products::add_review),
        )
}

/// Create the affiliate routes router.
pub fn affiliate_routes() -> Router<AppState> {
    Router::new()
        .route("/available-products", get(affiliate::available_products))
        .route("/claims", get(affiliate::claims).post(affiliate::create_claim))
        .route(
            "/claims/{id}",
            put(affiliate::update_claim).delete(affiliate::release_claim),
        )
        .route("/orders", get(affiliate::orders))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route(
            "/items/{line_id}",
            axum::routing::patch(cart::update).delete(cart::remove),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::checkout))
        .route("/{id}", get(orders::show))
        .route("/{id}/status", axum::routing::patch(orders::update_status))
}

/// Every `/api` route except auth.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/account/profile",
            get(account::profile).put(account::update_profile),
        )
        .nest("/products", product_routes())
        .route("/seller/products", get(seller::products))
        .route("/seller/orders", get(seller::orders))
        .nest("/affiliate", affiliate_routes())
        .route("/storefronts/{affiliate_id}", get(storefronts::show))
        .route("/favorites", get(favorites::index))
        .route(
            "/favorites/{product_id}",
            put(favorites::add).delete(favorites::remove),
        )
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .route("/media/signature", post(media::signature))
}

/// Build the full application: routes, middleware and state.
///
/// Generic over the session store so tests can run on the in-memory one.
pub fn app<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let mut auth = auth_routes();
    let mut api = api_routes();
    if state.config().rate_limit {
        let trusted_proxy = state.config().trusted_proxy;
        auth = auth.layer(auth_rate_limiter(trusted_proxy));
        api = api.layer(api_rate_limiter(trusted_proxy));
    }

    let session_layer = create_session_layer(session_store, state.config());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", Router::new().nest("/auth", auth).merge(api))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(session_layer)
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
