//! Gateway error types.
//!
//! Two layers, mirroring how a call travels through the gateway:
//!
//! - [`GatewayError`] is transport level. Decode failures, unknown methods and
//!   bad options never turn into a reply envelope; the caller gets the raw error.
//! - [`ApiError`] is reply level. Everything that goes wrong after a call has
//!   been routed ends up in `Reply.error` with a numeric code.

use crate::domain::rate_limit::RateLimit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric codes carried in `Reply.error.code`.
pub mod codes {
    // Server errors (-32000 to -32099)
    pub const SERVER_ERROR: i32 = -32000;
    pub const RESOURCE_NOT_FOUND: i32 = -32001;
    pub const RESOURCE_UNAVAILABLE: i32 = -32002;
    pub const TIMEOUT: i32 = -32006;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Backend throttling
    pub const RATE_LIMITED: i32 = -32029;
}

/// Reply-level error with a numeric code
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data (rate limit record for throttling failures)
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create error with additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Conversation lookup matched zero or several conversations, or the
    /// address was unusable.
    pub fn address_resolution(details: impl Into<String>) -> Self {
        Self::new(codes::RESOURCE_NOT_FOUND, details)
    }

    /// The caller asked to fail on stale data and the backend served it offline
    pub fn offline() -> Self {
        Self::new(
            codes::RESOURCE_UNAVAILABLE,
            "operation failed: inbox is offline",
        )
    }

    /// Backend throttled the call
    pub fn rate_limited(message: impl Into<String>, limit: &RateLimit) -> Self {
        Self::with_data(
            codes::RATE_LIMITED,
            message,
            serde_json::to_value(limit.to_wire()).unwrap_or_default(),
        )
    }

    /// Generic backend failure
    pub fn server_error(details: impl Into<String>) -> Self {
        Self::new(codes::SERVER_ERROR, details)
    }

    /// Internal error
    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            codes::INTERNAL_ERROR,
            format!("Internal error: {}", details.into()),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ApiError", 3)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref data) = self.data {
            state.serialize_field("data", data)?;
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for ApiError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ErrorHelper {
            code: i32,
            message: String,
            data: Option<serde_json::Value>,
        }

        let helper = ErrorHelper::deserialize(deserializer)?;
        Ok(ApiError {
            code: helper.code,
            message: helper.message,
            data: helper.data,
        })
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::RateLimited { message, limit } => {
                ApiError::rate_limited(message, &limit)
            }
            BackendError::NotFound(msg) => ApiError::new(codes::RESOURCE_NOT_FOUND, msg),
            BackendError::Timeout => ApiError::new(codes::TIMEOUT, "backend call timed out"),
            other => ApiError::server_error(other.to_string()),
        }
    }
}

/// Result type for handler operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Why a call envelope could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Input ended in the middle of a JSON value
    #[error("expected more JSON in input")]
    Truncated,

    /// Input is not a well-formed call object
    #[error("malformed call: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_eof() {
            DecodeError::Truncated
        } else {
            DecodeError::Malformed(e.to_string())
        }
    }
}

/// Transport-level errors. These never become a `Reply`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Call envelope could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Method name is not registered on the surface
    #[error("invalid v{version} method {method:?}")]
    UnknownMethod { method: String, version: u32 },

    /// Only API version 1 exists
    #[error("invalid version {version} for method {method:?}")]
    UnsupportedVersion { method: String, version: u32 },

    /// Options missing or failing validation
    #[error("invalid {method} v{version} options: {reason}")]
    InvalidOptions {
        method: String,
        version: u32,
        reason: String,
    },

    /// Request too large or too many calls in one input
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Reply could not be serialized
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Reply could not be written to the output
    #[error("write error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration rejected at construction
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn invalid_options(method: &str, version: u32, reason: impl Into<String>) -> Self {
        GatewayError::InvalidOptions {
            method: method.to_string(),
            version,
            reason: reason.into(),
        }
    }
}

/// Failures reported by a backend collaborator
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The backend throttled the request
    #[error("{message}")]
    RateLimited { message: String, limit: RateLimit },

    /// Requested entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// Backend rejected the request
    #[error("{0}")]
    Rejected(String),

    /// Backend could not be reached
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer in time
    #[error("backend call timed out")]
    Timeout,
}

/// Notification relay failures
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Filter setup or subscription failed before streaming began
    #[error("relay setup failed: {0}")]
    Setup(ApiError),

    /// Heartbeat failed, sink failed, or the event stream closed
    #[error("{0}")]
    ConnectionLost(String),
}
