//! Unified error handling with Sentry integration.
//!
//! Every session, wishlist and cart operation resolves to
//! `Result<MutationOutcome, StoreError>`. Failures are local to the operation:
//! none of them leave shared state half-applied and none are fatal.

use thiserror::Error;

use suraj_jewels_core::CredentialsError;

use crate::api::ApiError;
use crate::cart::CartStoreError;

/// Message shown when the server rejects a sign-in without saying why.
pub const DEFAULT_LOGIN_FAILURE: &str = "Invalid login credentials";

/// Outcome of a store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation needs a signed-in shopper (none, or the token expired).
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The server refused the credentials.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server could not be reached or answered with an error.
    #[error("Network failure: {0}")]
    NetworkFailure(#[source] ApiError),

    /// The device cart could not be written.
    #[error("Persistence error: {0}")]
    Persistence(#[from] CartStoreError),

    /// The sign-in form failed local validation.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(#[from] CredentialsError),

    /// Malformed input (e.g. a quantity for a product not in the cart).
    #[error("Validation failure: {0}")]
    Validation(String),
}

impl StoreError {
    /// Whether retrying the same call later may succeed.
    ///
    /// Nothing in the state layer retries on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::Persistence(_))
    }

    /// Text suitable for showing to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthenticationRequired => "Please sign in to continue".to_string(),
            Self::AuthenticationFailed(message) => message.clone(),
            Self::NetworkFailure(ApiError::RateLimited(_)) => {
                "Too many requests, please try again shortly".to_string()
            }
            Self::NetworkFailure(_) => "Could not reach the store, please try again".to_string(),
            Self::Persistence(_) => "Could not save your cart on this device".to_string(),
            Self::InvalidCredentials(errors) => errors
                .email
                .or(errors.password)
                .unwrap_or("Check the form and try again")
                .to_string(),
            Self::Validation(message) => message.clone(),
        }
    }

    /// Map a failed login request.
    pub(crate) fn from_login(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(_) | ApiError::Rejected { status: 400..=499, .. } => {
                let message = err
                    .server_message()
                    .unwrap_or(DEFAULT_LOGIN_FAILURE)
                    .to_string();
                Self::AuthenticationFailed(message)
            }
            other => Self::NetworkFailure(other),
        }
    }
}

/// Successful outcome of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The change was confirmed by the remote (or local) store.
    Applied,
    /// The state already matched; nothing was sent.
    Unchanged,
    /// The session changed while the request was in flight, so its result
    /// was not applied.
    Discarded,
}

/// Result type alias for `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "P1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
