//! Commerce API transport.
//!
//! # Architecture
//!
//! - [`Gateway`] issues every HTTP request to the remote commerce API
//! - The stored bearer credential is attached to each request when present
//! - A `401 Unauthorized` response evicts the persisted session globally,
//!   notifies registered [`SessionListener`]s, and broadcasts
//!   [`GatewayEvent::LoginRequired`] to navigation subscribers
//! - No retries, no backoff: every other non-2xx status is surfaced as-is
//!
//! # Example
//!
//! ```rust,ignore
//! use shopkeep_storefront::api::Gateway;
//!
//! let gateway = Gateway::new(&config, store.clone());
//! let mut events = gateway.subscribe();
//!
//! let products = gateway.get_products().await?;
//! ```

mod gateway;

pub(crate) use gateway::ListenerSet;
pub use gateway::{Gateway, GatewayEvent, REQUEST_ID_HEADER, SessionListener};

use serde::Deserialize;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur when talking to the commerce API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the session credential (401). The session has
    /// already been evicted when this is returned.
    #[error("Unauthorized{}", format_message(.message.as_deref()))]
    Unauthorized {
        /// Message from the error body, if any.
        message: Option<String>,
    },

    /// The API returned a non-success status other than 401.
    #[error("HTTP {status}{}", format_message(.message.as_deref()))]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message from the error body, if any.
        message: Option<String>,
    },

    /// Response body could not be decoded.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The persisted credential could not be read.
    #[error("Session storage error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Human-readable message supplied by the server, if any.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { message } | Self::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of the failed response, if a response was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error evicted the session.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

fn format_message(message: Option<&str>) -> String {
    message.map_or_else(String::new, |m| format!(": {m}"))
}

/// Error payload shape returned by the commerce API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Extract the optional `message` field from an error response body.
///
/// Returns `None` when the body is not JSON, has no `message`, or the
/// message is blank.
#[must_use]
pub fn parse_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}
