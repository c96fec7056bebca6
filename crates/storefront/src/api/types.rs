//! Wire types for the Remote Commerce API.
//!
//! Bodies are camelCase JSON. Successful responses wrap their payload in
//! `{ "data": ... }`; failures carry `{ "message": "..." }`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use suraj_jewels_core::{CartLine, CurrencyCode, Price, PriceError, ProductId, Session, UserId};

/// `{ "data": T }` success envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

/// `{ "message": "..." }` error body.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// `POST /auth/login` request body.
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST /auth/login` response payload.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Server-side user id (`_id` on the wire).
    #[serde(rename = "_id")]
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Bearer token.
    pub token: String,
    /// Token expiry, when the server reports one.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl From<LoginResponse> for Session {
    fn from(response: LoginResponse) -> Self {
        Self::new(
            response.id,
            response.name,
            SecretString::from(response.token),
            response.expires_at,
        )
    }
}

/// Cart line as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub currency: Option<CurrencyCode>,
    /// When the server last wrote this line, if it tracks that.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteCartLine {
    /// Convert into a domain cart line.
    ///
    /// Lines without a timestamp are treated as older than anything written
    /// locally.
    ///
    /// # Errors
    ///
    /// Returns `PriceError` for a negative unit price.
    pub fn into_cart_line(self) -> Result<CartLine, PriceError> {
        Ok(CartLine {
            unit_price: Price::new(self.unit_price, self.currency.unwrap_or_default())?,
            product_id: self.product_id,
            quantity: self.quantity,
            updated_at: self.updated_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
        })
    }
}

/// `POST`/`PUT /cart/:productId` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineBody {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub currency: CurrencyCode,
}

impl CartLineBody {
    /// Body for writing `quantity` units of a product at `unit_price`.
    #[must_use]
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Price) -> Self {
        Self {
            product_id,
            quantity,
            unit_price: unit_price.amount(),
            currency: unit_price.currency_code(),
        }
    }
}
