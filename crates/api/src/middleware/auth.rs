//! Authentication extractors.
//!
//! Provides extractors for requiring a logged-in user (optionally with a
//! given capability) in route handlers. Rejections are JSON [`AppError`]s.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use marketplace_core::UserRole;

use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};

/// Extractor that requires a logged-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireUser(user): RequireUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.display_name)
/// }
/// ```
pub struct RequireUser(pub CurrentUser);

/// Extractor that requires a user who may sell (seller or admin).
pub struct RequireSeller(pub CurrentUser);

/// Extractor that requires a user who may claim (affiliate or admin).
pub struct RequireAffiliate(pub CurrentUser);

async fn current_user(parts: &Parts) -> Option<CurrentUser> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

async fn require_role(
    parts: &Parts,
    allowed: fn(UserRole) -> bool,
    what: &str,
) -> Result<CurrentUser, AppError> {
    let user = current_user(parts)
        .await
        .ok_or_else(|| AppError::Unauthorized("login required".to_string()))?;
    if !allowed(user.role) {
        return Err(AppError::Forbidden(format!("only {what} can do this")));
    }
    Ok(user)
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require_role(parts, |_| true, "users").await.map(Self)
    }
}

impl<S> FromRequestParts<S> for RequireSeller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require_role(parts, UserRole::can_sell, "sellers").await.map(Self)
    }
}

impl<S> FromRequestParts<S> for RequireAffiliate
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require_role(parts, UserRole::can_claim, "affiliates")
            .await
            .map(Self)
    }
}

/// Helper to set the current user in the session.
///
/// Cycles the session id first so a pre-login id cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
