//! Core types for Suraj Jewels.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod credential;
pub mod email;
pub mod id;
pub mod price;
pub mod session;
pub mod status;

pub use cart::{CartLine, CartSnapshot, SyncedCart};
pub use credential::{Credentials, CredentialsError};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{CurrencyCode, Price, PriceError};
pub use session::Session;
pub use status::*;
