//! MCP (Model Context Protocol) tool session for Caravel.
//!
//! This crate manages the lifecycle of one external tool process — the
//! Playwright MCP server in the default deployment — and a correlated
//! request/response protocol over its stdio.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ToolSession                                                 │
//! │  - open(): spawn + handshake under a launch timeout          │
//! │  - call_tool(): correlated request/response, per-call        │
//! │    timeout, out-of-order safe                                │
//! │  - close(): idempotent, graceful-then-kill                   │
//! └──────────────────────────────────────────────────────────────┘
//!           │ writes framed requests          ▲ routes by id
//!           ▼                                 │
//! ┌──────────────────┐              ┌──────────────────┐
//! │  child stdin     │              │  reader task     │
//! └──────────────────┘              └──────────────────┘
//! ```
//!
//! The wire format is JSON-RPC 2.0 with Content-Length framing:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {...}}
//! ```
//!
//! Responses are matched to requests solely by the correlation id, so a
//! server that answers out of order still resolves every pending call
//! correctly. A call that sees no response within its timeout fails alone;
//! the session stays open for the next invocation.

pub mod error;
pub mod protocol;
pub mod session;
mod transport;

pub use error::{McpError, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerInfo,
    ToolContent, ToolInfo,
};
pub use session::{ToolSession, ToolSessionConfig};
