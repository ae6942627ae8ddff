//! User account types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marketplace_core::{Email, UserId, UserRole};

/// Maximum display name length, in characters.
pub const MAX_DISPLAY_NAME_LEN: usize = 80;
/// Maximum phone number length, in characters.
pub const MAX_PHONE_LEN: usize = 32;
/// Maximum postal address length, in characters.
pub const MAX_ADDRESS_LEN: usize = 500;

/// A marketplace account (without credentials).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub display_name: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("display name must be between 1 and {MAX_DISPLAY_NAME_LEN} characters")]
    DisplayName,
    #[error("phone must be at most {MAX_PHONE_LEN} characters")]
    Phone,
    #[error("address must be at most {MAX_ADDRESS_LEN} characters")]
    Address,
}

/// Profile fields a user may change. Absent fields are left as they are;
/// an empty phone or address clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Trim and length-check a display name.
///
/// # Errors
///
/// Returns [`ProfileError::DisplayName`] for blank or overlong names.
pub fn normalize_display_name(name: &str) -> Result<String, ProfileError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(ProfileError::DisplayName);
    }
    Ok(name.to_owned())
}

fn optional_field(
    value: &str,
    max: usize,
    err: ProfileError,
) -> Result<Option<String>, ProfileError> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(err);
    }
    Ok((!value.is_empty()).then(|| value.to_owned()))
}

impl ProfileUpdate {
    /// Apply the update to a user record.
    ///
    /// # Errors
    ///
    /// Returns a [`ProfileError`] and leaves `user` unchanged if any field
    /// is invalid.
    pub fn apply(self, user: &mut User, now: DateTime<Utc>) -> Result<(), ProfileError> {
        let display_name = self
            .display_name
            .as_deref()
            .map(normalize_display_name)
            .transpose()?;
        let phone = self
            .phone
            .as_deref()
            .map(|p| optional_field(p, MAX_PHONE_LEN, ProfileError::Phone))
            .transpose()?;
        let address = self
            .address
            .as_deref()
            .map(|a| optional_field(a, MAX_ADDRESS_LEN, ProfileError::Address))
            .transpose()?;

        if let Some(name) = display_name {
            user.display_name = name;
        }
        if let Some(phone) = phone {
            user.phone = phone;
        }
        if let Some(address) = address {
            user.address = address;
        }
        user.updated_at = now;
        Ok(())
    }
}
