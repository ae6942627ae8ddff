//! User roles.

use serde::{Deserialize, Serialize};

/// What a marketplace account is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Browses, favorites, reviews and buys.
    #[default]
    Customer,
    /// Uploads and owns products.
    Seller,
    /// Claims seller products into a storefront at a markup.
    Affiliate,
    /// Full access, including other users' listings and orders.
    Admin,
}

/// Error returned when parsing an unknown role name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl UserRole {
    /// Stable lowercase name used in storage and the API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Seller => "seller",
            Self::Affiliate => "affiliate",
            Self::Admin => "admin",
        }
    }

    /// Whether the role may create and manage products.
    #[must_use]
    pub const fn can_sell(self) -> bool {
        matches!(self, Self::Seller | Self::Admin)
    }

    /// Whether the role may claim products into a storefront.
    #[must_use]
    pub const fn can_claim(self) -> bool {
        matches!(self, Self::Affiliate | Self::Admin)
    }

    /// Whether the role may upload product media.
    #[must_use]
    pub const fn can_upload_media(self) -> bool {
        !matches!(self, Self::Customer)
    }

    /// Whether the role can be chosen at self-service registration.
    #[must_use]
    pub const fn is_self_service(self) -> bool {
        !matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "seller" => Ok(Self::Seller),
            "affiliate" => Ok(Self::Affiliate),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_str() {
        for role in [
            UserRole::Customer,
            UserRole::Seller,
            UserRole::Affiliate,
            UserRole::Admin,
        ] {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!("owner".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_capabilities() {
        assert!(UserRole::Seller.can_sell());
        assert!(!UserRole::Seller.can_claim());
        assert!(UserRole::Affiliate.can_claim());
        assert!(!UserRole::Customer.can_upload_media());
        assert!(!UserRole::Admin.is_self_service());
    }
}
