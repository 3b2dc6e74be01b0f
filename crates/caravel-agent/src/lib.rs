//! Agent core for Caravel.
//!
//! Binds the reasoning engine, the tool session, and the conversation
//! history into the turn-based orchestration loop:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Orchestrator                                            │
//! │  Init → Scripted → Interactive → ShuttingDown → Done     │
//! └──────────────────────────────────────────────────────────┘
//!          │ one instruction per turn
//!          ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  Agent::turn — reasoning loop                            │
//! │  model → tool invocations (in order) → model → …         │
//! └──────────────────────────────────────────────────────────┘
//!     │ ModelBackend                │ Toolset
//!     ▼                             ▼
//!  caravel-llm                  caravel-mcp
//! ```
//!
//! Failures are values: a turn that cannot converge or whose model request
//! exhausted its retries is recorded in history with a failure outcome and
//! the loop moves on. Only a dead tool process or cancellation ends the run,
//! and both routes still pass through shutdown, so the tool session is
//! closed on every exit path.

pub mod agent;
pub mod error;
pub mod mcp;
pub mod orchestrator;
pub mod source;
pub mod tool;
pub mod types;

pub use agent::{Agent, AgentConfig};
pub use error::{AgentError, Result};
pub use mcp::McpToolset;
pub use orchestrator::{
    NullObserver, Orchestrator, OrchestratorConfig, Phase, RunSummary, TurnObserver,
};
pub use source::{InstructionSource, QueueSource, is_exit_token};
pub use tool::{MockToolset, SharedToolset, ToolResult, Toolset};
pub use types::{
    Session, SessionId, ToolCall, ToolResultRecord, Turn, TurnFailure, TurnOutcome,
};
