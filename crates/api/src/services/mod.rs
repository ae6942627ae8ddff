//! Business logic services for the marketplace.
//!
//! # Services
//!
//! - `auth` - Registration, login and password hashing
//! - `catalog` - Cached catalog reads and listing views
//! - `media` - Signed direct uploads to the image CDN
//! - `orders` - Cart pricing, checkout and order status changes

pub mod auth;
pub mod catalog;
pub mod media;
pub mod orders;
