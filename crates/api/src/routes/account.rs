//! Account profile handlers.

use axum::{Json, extract::State};
use chrono::Utc;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::{CurrentUser, ProfileUpdate, User, session_keys};
use crate::state::AppState;

async fn load_user(state: &AppState, user: &CurrentUser) -> Result<User> {
    state
        .store()
        .user(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("account not found".to_string()))
}

/// Show the profile.
pub async fn profile(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<User>> {
    Ok(Json(load_user(&state, &current).await?))
}

/// Update display name, phone or address.
#[instrument(skip(state, session, current, update), fields(user_id = %current.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    RequireUser(current): RequireUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>> {
    let mut user = load_user(&state, &current).await?;
    update.apply(&mut user, Utc::now())?;
    state.store().update_user(&user).await?;

    // Keep the session copy of the display name current
    session
        .insert(session_keys::CURRENT_USER, CurrentUser::from(&user))
        .await?;

    Ok(Json(user))
}
