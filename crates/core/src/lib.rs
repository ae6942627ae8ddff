//! Marketplace Core - Domain types and business rules.
//!
//! This crate holds everything the marketplace knows about its domain:
//! - [`types`] - Newtype IDs, money, email addresses and roles
//! - [`catalog`] - Seller products and their validation
//! - [`claim`] - Affiliate claims and the markup rule
//! - [`listing`] - Filtering, sorting and pagination of product listings
//! - [`cart`] - Session carts and pricing
//! - [`order`] - Orders and the order status machine
//! - [`review`] - Product reviews and rating summaries
//! - [`favorite`] - Per-user favorite products
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP. Persistence and transport live in the `api`
//! crate, which calls into these rules.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod claim;
pub mod favorite;
pub mod listing;
pub mod order;
pub mod review;
pub mod types;

pub use types::*;
