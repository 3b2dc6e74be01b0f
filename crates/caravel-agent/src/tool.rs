//! Tool dispatch seam.
//!
//! The reasoning loop sees tools as a closed set negotiated at startup and a
//! single [`Toolset::invoke`] capability. Unknown tool names are a distinct
//! error surfaced back to the model, never a silent no-op. The real
//! implementation is [`crate::mcp::McpToolset`]; [`MockToolset`] scripts the
//! seam for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use caravel_llm::ToolDefinition;

use crate::error::Result;

/// Result of one tool invocation, as the reasoning loop sees it.
#[derive(Debug, Clone)]
pub enum ToolResult {
    /// Successful output.
    Text { content: String },
    /// The invocation failed; the detail goes back to the model.
    Error { content: String },
}

impl ToolResult {
    /// Create a successful result.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Create an error result.
    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }

    /// Whether the invocation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// The payload or error detail.
    pub fn content(&self) -> &str {
        match self {
            Self::Text { content } | Self::Error { content } => content,
        }
    }
}

/// The closed set of tools available to a session, with one invoke
/// capability.
///
/// Turn-scoped faults (timeouts, tool-reported errors) come back as
/// [`ToolResult::Error`]; an `Err` from `invoke` means the session itself is
/// dead and aborts the run.
#[async_trait]
pub trait Toolset: Send + Sync {
    /// Definitions of every available tool.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Whether a tool with this name was negotiated.
    fn contains(&self, name: &str) -> bool {
        self.definitions().iter().any(|d| d.name == name)
    }

    /// Invoke a tool by name.
    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolResult>;

    /// Release the underlying resources. Idempotent.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A toolset that can be shared between the agent and the orchestrator.
pub type SharedToolset = Arc<dyn Toolset>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Toolset
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted toolset for tests.
///
/// Records every invocation in order, answers from a fixed response map, and
/// can delay responses or fail fatally on demand.
#[derive(Default)]
pub struct MockToolset {
    definitions: Vec<ToolDefinition>,
    responses: HashMap<String, ToolResult>,
    fatal: std::collections::HashSet<String>,
    delay: Option<Duration>,
    invocations: std::sync::Mutex<Vec<(String, Value)>>,
    closes: std::sync::atomic::AtomicUsize,
}

impl MockToolset {
    /// Create an empty mock toolset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with a scripted response.
    pub fn with_tool(mut self, name: &str, response: ToolResult) -> Self {
        self.definitions.push(ToolDefinition::new(
            name,
            format!("mock tool: {name}"),
            serde_json::json!({"type": "object", "properties": {}}),
        ));
        self.responses.insert(name.to_string(), response);
        self
    }

    /// Register a tool whose invocation fails fatally (dead session).
    pub fn with_fatal_tool(mut self, name: &str) -> Self {
        self.definitions.push(ToolDefinition::new(
            name,
            format!("mock tool: {name}"),
            serde_json::json!({"type": "object", "properties": {}}),
        ));
        self.fatal.insert(name.to_string());
        self
    }

    /// Delay every invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Invocations made so far, in dispatch order.
    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().unwrap().clone()
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.closes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Toolset for MockToolset {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fatal.contains(name) {
            return Err(caravel_mcp::McpError::ConnectionClosed.into());
        }

        Ok(self
            .responses
            .get(name)
            .cloned()
            .unwrap_or_else(|| ToolResult::error(format!("tool '{name}' not found"))))
    }

    async fn close(&self) -> Result<()> {
        self.closes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
