//! Storefront client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_API_URL` - Base URL of the Remote Commerce API
//!
//! ## Optional
//! - `STOREFRONT_API_TIMEOUT_SECS` - Per-request timeout (default: 15)
//! - `STOREFRONT_CART_PATH` - Device cart file (default: .suraj-jewels/cart.json)
//! - `STOREFRONT_SCROLL_THRESHOLD` - Header shrink offset (default: 80)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Scroll offset past which the header switches to its compact look.
pub const DEFAULT_SCROLL_THRESHOLD: f64 = 80.0;

const DEFAULT_TIMEOUT_SECS: &str = "15";
const DEFAULT_CART_PATH: &str = ".suraj-jewels/cart.json";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Remote Commerce API base URL, always ending in `/`
    pub api_base_url: Url,
    /// Timeout applied to every API request
    pub request_timeout: Duration,
    /// Where the device cart is persisted
    pub cart_path: PathBuf,
    /// Scroll offset threshold for the shrunk header
    pub scroll_threshold: f64,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production", "staging")
    pub sentry_environment: Option<String>,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_base_url(&get_required_env("STOREFRONT_API_URL")?)?;

        let timeout_secs = get_env_or_default("STOREFRONT_API_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_API_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        let cart_path = PathBuf::from(get_env_or_default("STOREFRONT_CART_PATH", DEFAULT_CART_PATH));

        let scroll_threshold = match get_optional_env("STOREFRONT_SCROLL_THRESHOLD") {
            Some(raw) => parse_threshold(&raw)?,
            None => DEFAULT_SCROLL_THRESHOLD,
        };

        Ok(Self {
            api_base_url,
            request_timeout: Duration::from_secs(timeout_secs),
            cart_path,
            scroll_threshold,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Configuration pointing at `api_base_url` with every other value defaulted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL cannot be parsed.
    pub fn with_api_url(api_base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: parse_base_url(api_base_url)?,
            request_timeout: Duration::from_secs(15),
            cart_path: PathBuf::from(DEFAULT_CART_PATH),
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
            sentry_dsn: None,
            sentry_environment: None,
        })
    }
}

/// Parse the API base URL, adding the trailing slash `Url::join` relies on.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar("STOREFRONT_API_URL".to_string(), reason);

    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_threshold(raw: &str) -> Result<f64, ConfigError> {
    let invalid = |reason: String| {
        ConfigError::InvalidEnvVar("STOREFRONT_SCROLL_THRESHOLD".to_string(), reason)
    };
    let value = raw.trim().parse::<f64>().map_err(|e| invalid(e.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(format!("must be a non-negative number (got {value})")));
    }
    Ok(value)
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
