//! Error types and classification for outbound API calls.
//!
//! Every error raised by an API client is classified as [`ErrorKind::Transient`]
//! (worth retrying) or [`ErrorKind::Permanent`] (never retried). The retry
//! policy and the circuit breaker act only on this classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `GatewayError`
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Whether retrying the same request could plausibly succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Timeouts, 5xx, connection resets, throttling by the upstream
    Transient,
    /// Validation errors, authentication failures, other 4xx
    Permanent,
}

impl ErrorKind {
    /// Classify an upstream HTTP status code
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            408 | 425 | 429 => Self::Transient,
            500..=599 => Self::Transient,
            _ => Self::Permanent,
        }
    }

    /// Check if this kind is eligible for retry
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Error raised by an API client or by the gateway around a single attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Request was rejected by the upstream as invalid
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// Credentials were missing or rejected
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message
        message: String,
    },

    /// Upstream answered with an error status
    #[error("Upstream error: {api} returned {status} - {message}")]
    Upstream {
        /// API label
        api: String,
        /// HTTP status code from the upstream
        status: u16,
        /// Error message
        message: String,
    },

    /// Connection could not be established or was reset
    #[error("Connection error: {message}")]
    Connection {
        /// Error message
        message: String,
    },

    /// Attempt exceeded its timeout
    #[error("Request timeout after {duration:?}")]
    Timeout {
        /// Duration after which the attempt timed out
        duration: Duration,
    },

    /// Upstream answered successfully but the payload was unusable
    #[error("Malformed response: {message}")]
    MalformedResponse {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Upstream { status, .. } => ErrorKind::from_status(*status),
            Self::Connection { .. } | Self::Timeout { .. } | Self::MalformedResponse { .. } => {
                ErrorKind::Transient
            }
            Self::Validation { .. }
            | Self::Authentication { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => ErrorKind::Permanent,
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Get the error code for programmatic handling
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Authentication { .. } => "authentication_failed",
            Self::Upstream { .. } => "upstream_error",
            Self::Connection { .. } => "connection_error",
            Self::Timeout { .. } => "timeout",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an authentication error
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create an upstream status error
    #[must_use]
    pub fn upstream(api: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            api: api.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a connection error
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create a malformed response error
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
