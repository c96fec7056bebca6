//! `reqwest` implementation of [`CommerceApi`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use suraj_jewels_core::{Credentials, ProductId};

use super::types::{CartLineBody, Envelope, ErrorBody, LoginRequest, LoginResponse, RemoteCartLine};
use super::{ApiError, CommerceApi};
use crate::config::StorefrontConfig;

/// Longest slice of a response body copied into logs and errors.
const BODY_PREVIEW_CHARS: usize = 200;

/// HTTP client for the Remote Commerce API.
///
/// Cheaply cloneable; clones share the connection pool.
#[derive(Clone)]
pub struct HttpCommerceApi {
    inner: Arc<HttpCommerceApiInner>,
}

struct HttpCommerceApiInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCommerceApi {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the underlying client cannot be built
    /// (for example when no TLS backend is available).
    pub fn new(config: &StorefrontConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpCommerceApiInner {
                client,
                base_url: config.api_base_url.clone(),
            }),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self.inner.base_url.join(path).map_err(|e| ApiError::Rejected {
            status: 0,
            message: format!("invalid request path '{path}': {e}"),
        })?;
        Ok(self.inner.client.request(method, url))
    }

    fn authed(
        &self,
        method: Method,
        path: &str,
        token: &SecretString,
    ) -> Result<RequestBuilder, ApiError> {
        Ok(self.request(method, path)?.bearer_auth(token.expose_secret()))
    }

    /// Send a request and return the raw body of a successful response.
    async fn execute(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized(error_message(&body)));
        }

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                body = %preview(&body),
                "Commerce API returned non-success status"
            );
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(body)
    }

    /// Send a request and decode the `data` payload.
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) => Ok(envelope.data),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %preview(&body),
                    "Failed to parse Commerce API response"
                );
                Err(ApiError::Parse(e))
            }
        }
    }

    /// Send a write whose response payload is not needed.
    async fn write(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let body = self.execute(request).await?;
        debug!(bytes = body.len(), "Write acknowledged");
        Ok(())
    }
}

#[async_trait]
impl CommerceApi for HttpCommerceApi {
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        let body = LoginRequest {
            email: credentials.email().as_str(),
            password: credentials.expose_password(),
        };
        self.fetch(self.request(Method::POST, "auth/login")?.json(&body))
            .await
    }

    #[instrument(skip(self, token))]
    async fn logout(&self, token: &SecretString) -> Result<(), ApiError> {
        self.write(self.authed(Method::POST, "auth/logout", token)?)
            .await
    }

    #[instrument(skip(self, token))]
    async fn fetch_wishlist(&self, token: &SecretString) -> Result<Vec<ProductId>, ApiError> {
        self.fetch(self.authed(Method::GET, "wishlist", token)?)
            .await
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn add_to_wishlist(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        let path = item_path("wishlist", product_id);
        let body = serde_json::json!({ "productId": product_id });
        self.write(self.authed(Method::POST, &path, token)?.json(&body))
            .await
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn remove_from_wishlist(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        let path = item_path("wishlist", product_id);
        self.write(self.authed(Method::DELETE, &path, token)?)
            .await
    }

    #[instrument(skip(self, token))]
    async fn fetch_cart(&self, token: &SecretString) -> Result<Vec<RemoteCartLine>, ApiError> {
        self.fetch(self.authed(Method::GET, "cart", token)?).await
    }

    #[instrument(skip(self, token, line), fields(product_id = %line.product_id, quantity = line.quantity))]
    async fn create_cart_line(
        &self,
        token: &SecretString,
        line: &CartLineBody,
    ) -> Result<(), ApiError> {
        let path = item_path("cart", &line.product_id);
        self.write(self.authed(Method::POST, &path, token)?.json(line))
            .await
    }

    #[instrument(skip(self, token, line), fields(product_id = %line.product_id, quantity = line.quantity))]
    async fn update_cart_line(
        &self,
        token: &SecretString,
        line: &CartLineBody,
    ) -> Result<(), ApiError> {
        let path = item_path("cart", &line.product_id);
        self.write(self.authed(Method::PUT, &path, token)?.json(line))
            .await
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn delete_cart_line(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        let path = item_path("cart", product_id);
        self.write(self.authed(Method::DELETE, &path, token)?)
            .await
    }
}

/// Relative path for a single item, with the id percent-encoded.
fn item_path(collection: &str, product_id: &ProductId) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(product_id.as_str().as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("{collection}/{encoded}")
}

/// Pull `message` out of an error body, falling back to a body preview.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| preview(body))
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
