//! Error types for RunAudit

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias using RunAudit's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for RunAudit operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP error (connect, timeout, decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Remote function invocation failed
    #[error("Error invoking function {function}: {message}")]
    Invoke {
        /// Function name
        function: String,
        /// SDK or function error text
        message: String,
    },

    /// Email could not be dispatched
    #[error("Error sending email: {0}")]
    Dispatch(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invocation error for the named function
    pub fn invoke(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invoke {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Whether a fetch that failed with this error may be attempted again
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::UpstreamStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status reported when this error reaches an API caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Http(_) | Self::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
            Self::Config(_)
            | Self::Invoke { .. }
            | Self::Dispatch(_)
            | Self::Internal(_)
            | Self::Io(_)
            | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
