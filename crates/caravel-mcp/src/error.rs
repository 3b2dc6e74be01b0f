//! Error types for tool session operations.

use thiserror::Error;

/// Result type for tool session operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for tool session operations.
///
/// Fatality depends on where the error is raised: anything during
/// [`crate::ToolSession::open`] is fatal to the caller, while per-call
/// failures ([`McpError::Timeout`], [`McpError::ServerError`]) leave the
/// session open and usable. [`McpError::ConnectionClosed`] means the process
/// is gone and the session is unrecoverable.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to spawn the tool process.
    #[error("failed to spawn tool process: {0}")]
    SpawnFailed(String),

    /// The capability handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Failed to communicate with the tool process.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer violated the framing or JSON-RPC protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered a request with a JSON-RPC error.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// A correlation id was reissued while still in flight.
    #[error("correlation id {0} already in flight")]
    CorrelationConflict(u64),

    /// The process exited or its stdout closed while requests were pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// No response arrived within the per-call timeout.
    #[error("timed out waiting for tool response")]
    Timeout,

    /// The session was already closed.
    #[error("tool session is closed")]
    Closed,
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Whether this error means the session itself is dead.
    ///
    /// Per-call failures are survivable; transport-level faults are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed(_)
                | Self::Handshake(_)
                | Self::Transport(_)
                | Self::ConnectionClosed
                | Self::Io(_)
        )
    }
}
