//! Remote Commerce API client.
//!
//! # Architecture
//!
//! - [`CommerceApi`] is the seam between the state layer and the server; the
//!   stores only ever see this trait
//! - [`HttpCommerceApi`] is the `reqwest` implementation
//! - Every call is a single request/response; retries are the caller's choice
//!
//! # Endpoints
//!
//! ```text
//! POST   /auth/login             - Sign in, returns user + token
//! POST   /auth/logout            - Revoke the token (best effort)
//! GET    /wishlist               - Product ids on the wishlist
//! POST   /wishlist/:productId    - Add to wishlist
//! DELETE /wishlist/:productId    - Remove from wishlist
//! GET    /cart                   - Remote cart lines
//! POST   /cart/:productId        - Create a line
//! PUT    /cart/:productId        - Replace a line's quantity
//! DELETE /cart/:productId        - Delete a line
//! ```

mod http;
pub mod types;

pub use http::HttpCommerceApi;
pub use types::{CartLineBody, LoginResponse, RemoteCartLine};

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use suraj_jewels_core::{Credentials, ProductId};

/// Errors that can occur when talking to the Remote Commerce API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The token was missing, expired or revoked (HTTP 401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// `message` from the error body, or a truncated raw body.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by the server.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Used by in-process implementations that cannot reach their backend.
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    /// Whether the server rejected the credentials or token.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Server-provided message, if the server sent one.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Unauthorized(message) | Self::Rejected { message, .. } if !message.is_empty() => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// Request/response contract of the Remote Commerce API.
///
/// Implementations must be cheap to share (`Arc<dyn CommerceApi>`) and must
/// not hold any shopper state of their own.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Exchange credentials for a session token.
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError>;

    /// Revoke a session token.
    async fn logout(&self, token: &SecretString) -> Result<(), ApiError>;

    /// Fetch the wishlist of the token's owner.
    async fn fetch_wishlist(&self, token: &SecretString) -> Result<Vec<ProductId>, ApiError>;

    /// Add a product to the wishlist.
    async fn add_to_wishlist(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError>;

    /// Remove a product from the wishlist.
    async fn remove_from_wishlist(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError>;

    /// Fetch the remote cart of the token's owner.
    async fn fetch_cart(&self, token: &SecretString) -> Result<Vec<RemoteCartLine>, ApiError>;

    /// Create a cart line.
    async fn create_cart_line(
        &self,
        token: &SecretString,
        line: &CartLineBody,
    ) -> Result<(), ApiError>;

    /// Replace the quantity of an existing cart line.
    async fn update_cart_line(
        &self,
        token: &SecretString,
        line: &CartLineBody,
    ) -> Result<(), ApiError>;

    /// Delete a cart line.
    async fn delete_cart_line(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message() {
        let err = ApiError::Rejected {
            status: 400,
            message: "Out of stock".to_string(),
        };
        assert_eq!(err.server_message(), Some("Out of stock"));

        let err = ApiError::Unauthorized(String::new());
        assert_eq!(err.server_message(), None);
        assert!(err.is_unauthorized());

        assert_eq!(ApiError::RateLimited(3).server_message(), None);
    }

    #[test]
    fn test_display() {
        let err = ApiError::Rejected {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
    }
}
