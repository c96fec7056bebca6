//! Suraj Jewels Core - Shared domain types.
//!
//! This crate provides the types used across the Suraj Jewels storefront client:
//! - `storefront` - Session, wishlist, cart and navigation state synchronization
//! - `cli` - Command-line driver for the storefront state layer
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no async. This keeps it lightweight and usable from any surface.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, prices, emails, login credentials,
//!   sessions, cart lines and notifications

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
