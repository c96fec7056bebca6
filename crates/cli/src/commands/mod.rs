//! Command implementations.

pub mod account;
pub mod cart;

use thiserror::Error;

use suraj_jewels_core::PriceError;
use suraj_jewels_storefront::StoreError;
use suraj_jewels_storefront::state::InitError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Init(#[from] InitError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("Invalid price: {0}")]
    Price(#[from] PriceError),
}
