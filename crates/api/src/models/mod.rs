//! Account and session models for the API.
//!
//! Catalog, claim, cart and order types come from `marketplace-core`; this
//! module only adds what the HTTP layer owns: user accounts and the data
//! kept in a session.

pub mod session;
pub mod user;

pub use session::{CurrentUser, keys as session_keys};
pub use user::{ProfileError, ProfileUpdate, User};
