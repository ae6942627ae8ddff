//! Authentication error types.

use thiserror::Error;

use marketplace_core::UserRole;

use crate::db::RepositoryError;
use crate::models::ProfileError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] marketplace_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Role cannot be chosen at registration.
    #[error("role '{0}' cannot be chosen at registration")]
    RoleNotAllowed(UserRole),

    /// Display name or other profile field is invalid.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
