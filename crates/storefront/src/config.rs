//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `SHOPKEEP_API_URL` - Commerce API base URL (default: `http://localhost:8080/api`)
//! - `SHOPKEEP_IMAGE_BASE_URL` - Base URL for product images (default: `http://localhost:8080`)
//! - `SHOPKEEP_SESSION_FILE` - Where the CLI persists the session (default: `.shopkeep-session.json`)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_IMAGE_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_SESSION_FILE: &str = ".shopkeep-session.json";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Commerce API base URL, without a trailing slash
    pub api_url: String,
    /// Base URL that relative product image references resolve against
    pub image_base_url: String,
    /// Session file used by file-backed session stores
    pub session_file: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a URL variable is not a valid `http(s)` URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a URL variable is not a valid `http(s)` URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_or_default = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let api_url = validate_url(
            "SHOPKEEP_API_URL",
            &get_or_default("SHOPKEEP_API_URL", DEFAULT_API_URL),
        )?;
        let image_base_url = validate_url(
            "SHOPKEEP_IMAGE_BASE_URL",
            &get_or_default("SHOPKEEP_IMAGE_BASE_URL", DEFAULT_IMAGE_BASE_URL),
        )?;
        let session_file = PathBuf::from(get_or_default(
            "SHOPKEEP_SESSION_FILE",
            DEFAULT_SESSION_FILE,
        ));
        let sentry_dsn = lookup("SENTRY_DSN").filter(|v| !v.trim().is_empty());

        Ok(Self {
            api_url,
            image_base_url,
            session_file,
            sentry_dsn,
        })
    }

    /// Replace the API base URL, validating it like `SHOPKEEP_API_URL`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `api_url` is not a valid `http(s)` URL.
    pub fn with_api_url(mut self, api_url: &str) -> Result<Self, ConfigError> {
        self.api_url = validate_url("SHOPKEEP_API_URL", api_url)?;
        Ok(self)
    }

    /// Configuration pointing at `api_url` with every other value defaulted.
    ///
    /// Intended for tests and embedders that already know the API location.
    #[must_use]
    pub fn for_api_url(api_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            image_base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            sentry_dsn: None,
        }
    }
}

/// Validate an `http(s)` URL and strip any trailing slash.
fn validate_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}
