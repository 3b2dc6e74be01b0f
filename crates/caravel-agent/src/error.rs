//! Error types for the agent crate.
//!
//! Only faults that end the whole run surface as [`AgentError`]. Failures
//! scoped to a single turn — a model request that exhausted its retries, a
//! reasoning loop that hit its iteration bound — are recorded as values in
//! the turn's outcome and never unwind past the turn boundary.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Fatal error for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Reasoning-engine fault outside any turn (client construction).
    #[error("LLM error: {0}")]
    Llm(#[from] caravel_llm::LlmError),

    /// Tool session fault: spawn/handshake failure or process death.
    #[error("tool session error: {0}")]
    ToolSession(#[from] caravel_mcp::McpError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The run was interrupted by an external cancellation signal.
    #[error("cancelled")]
    Cancelled,
}
