//! Authenticated session identity.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use super::id::UserId;

/// The signed-in shopper.
///
/// Absence of a `Session` means the shopper is anonymous. The auth token is
/// kept secret so the session can be logged with `{:?}` safely.
#[derive(Debug, Clone)]
pub struct Session {
    /// Server-side user id.
    pub user_id: UserId,
    /// Name shown in the header menu.
    pub display_name: String,
    auth_token: SecretString,
    /// When the token stops being accepted, if the server told us.
    pub expiry: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session from a successful login response.
    #[must_use]
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        auth_token: SecretString,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            auth_token,
            expiry,
        }
    }

    /// The bearer token for authenticated requests.
    #[must_use]
    pub const fn auth_token(&self) -> &SecretString {
        &self.auth_token
    }

    /// Whether the token is past its expiry at `now`.
    ///
    /// Sessions without an expiry never expire locally; the server still
    /// rejects stale tokens with a 401.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Whether two sessions carry the same token.
    #[must_use]
    pub fn same_token(&self, other: &Self) -> bool {
        self.auth_token.expose_secret() == other.auth_token.expose_secret()
    }
}
