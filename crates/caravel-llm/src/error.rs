//! Error types for the LLM crate.

use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Error type for reasoning-engine operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider answered with a non-success HTTP status.
    ///
    /// Whether this is worth retrying is the retry policy's call — the
    /// error itself just carries the observed failure code.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Network/connectivity failure before any status was observed.
    #[error("network error: {0}")]
    Network(String),

    /// Authentication failed (bad or revoked credential).
    #[error("authentication error: {0}")]
    Auth(String),

    /// Client-side configuration problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The provider returned a well-formed but unusable response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Create an HTTP error from a status and message.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// The HTTP failure code observed, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("request timed out: {err}"))
        } else if err.is_connect() {
            LlmError::Network(format!("connection failed: {err}"))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}
