//! MCP adapter for the tool dispatch seam.
//!
//! [`McpToolset`] exposes one [`ToolSession`]'s negotiated tools through the
//! [`Toolset`] trait. Per-call faults — a timeout, a server-reported error —
//! become error results the reasoning loop feeds back to the model; faults
//! that mean the process is gone abort the run.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use caravel_llm::ToolDefinition;
use caravel_mcp::ToolSession;

use crate::error::Result;
use crate::tool::{ToolResult, Toolset};

/// Adapter exposing an MCP tool session as a [`Toolset`].
pub struct McpToolset {
    session: Arc<ToolSession>,
}

impl McpToolset {
    /// Wrap an opened tool session.
    pub fn new(session: Arc<ToolSession>) -> Self {
        Self { session }
    }

    /// The underlying session.
    pub fn session(&self) -> &Arc<ToolSession> {
        &self.session
    }
}

#[async_trait]
impl Toolset for McpToolset {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.session
            .tools()
            .iter()
            .map(|tool| {
                ToolDefinition::new(
                    &tool.name,
                    tool.description
                        .clone()
                        .unwrap_or_else(|| format!("MCP tool: {}", tool.name)),
                    tool.input_schema.clone().unwrap_or_else(|| {
                        serde_json::json!({"type": "object", "properties": {}})
                    }),
                )
            })
            .collect()
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        tracing::debug!(server = %self.session.name(), tool = %name, "invoking MCP tool");

        match self.session.call_tool(name, Some(arguments)).await {
            Ok(result) if result.is_error() => Ok(ToolResult::error(result.text())),
            Ok(result) => Ok(ToolResult::text(result.text())),
            Err(e) if e.is_fatal() => {
                tracing::error!(server = %self.session.name(), tool = %name, error = %e, "tool session fault");
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(server = %self.session.name(), tool = %name, error = %e, "tool call failed");
                Ok(ToolResult::error(format!("tool call failed: {e}")))
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await?;
        Ok(())
    }
}
