//! Suraj Jewels storefront state layer.
//!
//! Session, wishlist and cart state shared by every surface of the
//! storefront, kept in sync with the Remote Commerce API, plus the header's
//! navigation state machine.
//!
//! # Architecture
//!
//! - [`state::Storefront`] owns one of each store and hands them to surfaces
//! - Stores apply changes optimistically and queue the remote write per
//!   product; a failed write rolls back only its own change
//! - [`session::SessionStore`] numbers each session lifetime; writes that
//!   finish after the shopper signed out or in again are discarded
//! - Everything talks to the server through the [`api::CommerceApi`] trait

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod header;
pub mod navigation;
pub mod notify;
pub mod observer;
mod queue;
pub mod session;
pub mod state;
pub mod surface;
pub mod wishlist;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::StorefrontConfig;
pub use error::{MutationOutcome, StoreError};
pub use state::Storefront;
