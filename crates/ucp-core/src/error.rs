//! # UCP Error Types
//!
//! Typed error handling for the ucp-cart integration layer.
//! All fallible operations return `Result<T, UcpError>`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Core error type for discovery, checkout and exchange-rate operations
#[derive(Debug, Error)]
pub enum UcpError {
    /// Manifest, schema or checkout endpoint could not be discovered
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Malformed local input, rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network or HTTP failure
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    /// Well-formed JSON-RPC error returned by the remote service
    #[error("Remote error: {0}")]
    Application(JsonRpcError),

    /// Cart-permalink fallback was attempted but no cart tokens could be derived
    #[error("Fallback exhausted, original error: {0}")]
    FallbackExhausted(JsonRpcError),

    /// Storefront product lookup failed and no variant id was available
    #[error("Product lookup failed for {handle} ({url})")]
    ProductLookup { handle: String, url: String },

    /// Product exists but has no selectable variant
    #[error("No variant available for product {handle}")]
    NoVariant { handle: String },

    /// Rate source has no data published for the given date
    #[error("No rate data for {date}")]
    NoRateData { date: String },

    /// Rate source answered with something other than rate rows
    #[error("Rate source error: {0}")]
    RateSource(String),

    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cache directory or file could not be written
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification used by callers that render responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Resolution,
    Validation,
    Transport,
    Application,
    FallbackExhausted,
    Internal,
}

impl UcpError {
    /// Build a transport error without an HTTP status
    pub fn transport(message: impl Into<String>) -> Self {
        UcpError::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Build a transport error for a non-success HTTP status
    pub fn http_status(status: u16, url: &str) -> Self {
        UcpError::Transport {
            message: format!("HTTP {} from {}", status, url),
            status: Some(status),
        }
    }

    /// HTTP status attached to a transport error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            UcpError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns true if a higher layer may retry the same call
    pub fn is_retryable(&self) -> bool {
        matches!(self, UcpError::Transport { .. })
    }

    /// True only for the "nothing published for this date" condition
    pub fn is_no_rate_data(&self) -> bool {
        matches!(self, UcpError::NoRateData { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UcpError::Resolution(_) | UcpError::ProductLookup { .. } | UcpError::NoVariant { .. } => {
                ErrorKind::Resolution
            }
            UcpError::Validation(_) => ErrorKind::Validation,
            UcpError::Transport { .. } | UcpError::NoRateData { .. } | UcpError::RateSource(_) => {
                ErrorKind::Transport
            }
            UcpError::Application(_) => ErrorKind::Application,
            UcpError::FallbackExhausted(_) => ErrorKind::FallbackExhausted,
            UcpError::Configuration(_) | UcpError::Cache(_) | UcpError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<serde_json::Error> for UcpError {
    fn from(err: serde_json::Error) -> Self {
        UcpError::Serialization(err.to_string())
    }
}

/// Result type alias for UCP operations
pub type UcpResult<T> = Result<T, UcpError>;

/// A JSON-RPC 2.0 error object as returned by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Lift whatever sits under the envelope's `error` key into a typed error.
    /// Stores occasionally send a bare string instead of an object.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self {
                code: map.get("code").and_then(Value::as_i64),
                message: match map.get("message") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                },
                data: map.get("data").cloned(),
            },
            Value::String(s) => Self {
                code: None,
                message: s.clone(),
                data: None,
            },
            other => Self {
                code: None,
                message: other.to_string(),
                data: None,
            },
        }
    }

    /// `data` rendered as text, the way the fallback classifier inspects it
    pub fn data_text(&self) -> String {
        match &self.data {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub fn classify(&self) -> RemoteErrorKind {
        RemoteErrorKind::classify(self)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if self.data.is_some() {
            write!(f, " ({})", self.data_text())?;
        }
        Ok(())
    }
}

/// Remote error classes the checkout orchestrator reacts to.
///
/// Known store quirks:
/// - Shopify-hosted UCP endpoints reject unauthenticated agents with
///   `message == "AuthenticationFailed"` (exact match, no code contract).
/// - Some stores answer `create_checkout` with a generic error whose `data`
///   mentions `Unsupported` (e.g. "UnsupportedCapability") when the agent
///   capability profile is not accepted.
///
/// Both mean the checkout API is off-limits for this agent, but a cart
/// permalink still works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    AuthenticationFailed,
    Unsupported,
    Other,
}

impl RemoteErrorKind {
    pub fn classify(error: &JsonRpcError) -> Self {
        if error.message == "AuthenticationFailed" {
            RemoteErrorKind::AuthenticationFailed
        } else if error.data_text().contains("Unsupported") {
            RemoteErrorKind::Unsupported
        } else {
            RemoteErrorKind::Other
        }
    }

    /// Whether the orchestrator should build a cart permalink instead
    pub fn triggers_cart_fallback(self) -> bool {
        !matches!(self, RemoteErrorKind::Other)
    }
}
