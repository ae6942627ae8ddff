//! Session middleware configuration.
//!
//! Sessions hold the logged-in user and the cart. `PostgreSQL` backs them in
//! production; the in-memory store is used with the memory backend.

use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::config::MarketplaceConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "mkt_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session layer over `store`.
///
/// The `PostgreSQL` store needs the `tower_sessions.session` table from the
/// migrations.
#[must_use]
pub fn create_session_layer<S>(store: S, config: &MarketplaceConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
