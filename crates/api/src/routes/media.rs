//! Image upload signing.

use axum::{Json, extract::State};
use chrono::Utc;

use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::services::media::SignedUpload;
use crate::state::AppState;

/// Signed parameters for one direct upload to the image CDN.
pub async fn signature(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<SignedUpload>> {
    if !user.role.can_upload_media() {
        return Err(AppError::Forbidden(
            "customers cannot upload media".to_string(),
        ));
    }
    let signer = state
        .media()
        .ok_or_else(|| AppError::ServiceUnavailable("media uploads are not configured".to_string()))?;

    tracing::debug!(user_id = %user.id, "signed media upload");
    Ok(Json(signer.signed_upload(Utc::now())))
}
