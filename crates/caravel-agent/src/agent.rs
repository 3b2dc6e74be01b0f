//! The per-turn reasoning loop.
//!
//! [`Agent::turn`] resolves one instruction: it calls the model with the
//! full history and the negotiated tool set, dispatches any requested tool
//! invocations strictly in the order the model asked for them, feeds the
//! results back, and repeats until the model answers without tool calls or
//! the iteration bound is hit. The turn always resolves to a [`Turn`] value;
//! only a dead tool session escapes as an error.

use chrono::Utc;

use caravel_llm::{
    CompletionRequest, ContentBlock, Message, SharedBackend, ToolResultBlock,
};

use crate::error::Result;
use crate::tool::{SharedToolset, ToolResult};
use crate::types::{Session, ToolCall, ToolResultRecord, Turn, TurnFailure};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// System instruction bound to every request.
    pub system_prompt: Option<String>,
    /// Bound on reasoning iterations per turn.
    pub max_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: 25,
        }
    }
}

impl AgentConfig {
    /// Set the system instruction.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the iteration bound.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// An immutable binding of system instruction, model backend, and tool set.
pub struct Agent {
    backend: SharedBackend,
    toolset: SharedToolset,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent.
    pub fn new(backend: SharedBackend, toolset: SharedToolset, config: AgentConfig) -> Self {
        Self {
            backend,
            toolset,
            config,
        }
    }

    /// The agent configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Resolve one instruction into a turn.
    ///
    /// Turn-scoped failures (terminal model errors, the iteration bound)
    /// come back inside the [`Turn`]; an `Err` means the tool session died
    /// and the run cannot continue.
    pub async fn turn(&self, history: &Session, instruction: &str) -> Result<Turn> {
        let started_at = Utc::now();

        tracing::info!(
            session_id = %history.id,
            turn_index = history.turn_count(),
            instruction_len = instruction.len(),
            "turn started"
        );

        let mut messages = build_messages(history);
        messages.push(Message::user(instruction));

        let definitions = self.toolset.definitions();

        let mut all_calls: Vec<ToolCall> = Vec::new();
        let mut all_results: Vec<ToolResultRecord> = Vec::new();
        let mut iterations = 0u32;

        loop {
            iterations += 1;

            if iterations > self.config.max_iterations {
                tracing::warn!(
                    session_id = %history.id,
                    iterations,
                    "iteration bound exceeded"
                );
                return Ok(Turn::failed(
                    instruction,
                    TurnFailure::IterationBound(self.config.max_iterations),
                    all_calls,
                    all_results,
                    iterations - 1,
                    started_at,
                ));
            }

            let mut request = CompletionRequest::new(messages.clone()).with_tools(definitions.clone());
            if let Some(ref system) = self.config.system_prompt {
                request = request.with_system(system);
            }

            tracing::debug!(
                session_id = %history.id,
                iteration = iterations,
                messages = messages.len(),
                tools = definitions.len(),
                "calling model"
            );

            let response = match self.backend.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(
                        session_id = %history.id,
                        iteration = iterations,
                        error = %e,
                        "model request failed terminally"
                    );
                    return Ok(Turn::failed(
                        instruction,
                        TurnFailure::Model(e.to_string()),
                        all_calls,
                        all_results,
                        iterations,
                        started_at,
                    ));
                }
            };

            if response.has_tool_use() {
                let tool_uses = response.tool_uses();
                tracing::info!(
                    session_id = %history.id,
                    iteration = iterations,
                    tool_count = tool_uses.len(),
                    tools = %tool_uses.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", "),
                    "executing tools"
                );

                let mut result_blocks: Vec<ToolResultBlock> = Vec::new();

                // Dispatch in the order the model requested; each call is
                // awaited before the next is sent, so the transcript order
                // is the dispatch order.
                for tool_use in &tool_uses {
                    all_calls.push(ToolCall {
                        id: tool_use.id.clone(),
                        name: tool_use.name.clone(),
                        arguments: tool_use.input.clone(),
                    });

                    let result = if self.toolset.contains(&tool_use.name) {
                        self.toolset
                            .invoke(&tool_use.name, tool_use.input.clone())
                            .await?
                    } else {
                        tracing::warn!(tool = %tool_use.name, "model requested unknown tool");
                        ToolResult::error(format!("unknown tool '{}'", tool_use.name))
                    };

                    all_results.push(ToolResultRecord {
                        tool_call_id: tool_use.id.clone(),
                        success: result.is_success(),
                        content: result.content().to_string(),
                    });

                    result_blocks.push(if result.is_success() {
                        ToolResultBlock::success(&tool_use.id, result.content())
                    } else {
                        ToolResultBlock::error(&tool_use.id, result.content())
                    });
                }

                messages.push(Message::assistant_blocks(response.content.clone()));
                messages.push(Message::tool_results(result_blocks));
                continue;
            }

            let text = response.text();
            tracing::info!(
                session_id = %history.id,
                iterations,
                tool_calls = all_calls.len(),
                response_len = text.len(),
                "turn completed"
            );

            return Ok(Turn::completed(
                instruction,
                text,
                all_calls,
                all_results,
                iterations,
                started_at,
            ));
        }
    }
}

/// Replay session history as model messages.
fn build_messages(history: &Session) -> Vec<Message> {
    let mut messages = Vec::new();

    for turn in history.turns() {
        messages.push(Message::user(&turn.instruction));

        let mut assistant_blocks: Vec<ContentBlock> = turn
            .tool_calls
            .iter()
            .map(|call| ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            })
            .collect();

        if let Some(text) = turn.outcome.text() {
            if !text.is_empty() {
                assistant_blocks.push(ContentBlock::text(text));
            }
        }

        if !assistant_blocks.is_empty() {
            messages.push(Message::assistant_blocks(assistant_blocks));
        }

        if !turn.tool_results.is_empty() {
            let blocks = turn
                .tool_results
                .iter()
                .map(|record| {
                    if record.success {
                        ToolResultBlock::success(&record.tool_call_id, &record.content)
                    } else {
                        ToolResultBlock::error(&record.tool_call_id, &record.content)
                    }
                })
                .collect();
            messages.push(Message::tool_results(blocks));
        }
    }

    messages
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use caravel_llm::{CompletionResponse, LlmError, MockBackend, MockResult};

    use crate::tool::MockToolset;
    use crate::types::TurnOutcome;

    fn tool_use_response(calls: &[(&str, &str)]) -> CompletionResponse {
        CompletionResponse::new(
            calls
                .iter()
                .map(|(id, name)| ContentBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input: serde_json::json!({}),
                })
                .collect(),
        )
    }

    fn make_agent(backend: MockBackend, toolset: MockToolset, max_iterations: u32) -> Agent {
        Agent::new(
            Arc::new(backend),
            Arc::new(toolset),
            AgentConfig::default().with_max_iterations(max_iterations),
        )
    }

    #[tokio::test]
    async fn simple_turn_without_tools() {
        let agent = make_agent(
            MockBackend::with_text("Hello! How can I help?"),
            MockToolset::new(),
            25,
        );

        let history = Session::new();
        let turn = agent.turn(&history, "Hi there").await.unwrap();

        assert!(turn.is_success());
        assert_eq!(turn.outcome.text(), Some("Hello! How can I help?"));
        assert!(turn.tool_calls.is_empty());
        assert_eq!(turn.iterations, 1);
    }

    #[tokio::test]
    async fn turn_with_tool_use_loops_back() {
        let backend = MockBackend::new(vec![
            tool_use_response(&[("call_1", "browser_navigate")]),
            CompletionResponse::text_only("Page is open."),
        ]);
        let toolset =
            MockToolset::new().with_tool("browser_navigate", ToolResult::text("navigated"));

        let agent = make_agent(backend, toolset, 25);
        let history = Session::new();
        let turn = agent.turn(&history, "open the page").await.unwrap();

        assert!(turn.is_success());
        assert_eq!(turn.iterations, 2);
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_results.len(), 1);
        assert!(turn.tool_results[0].success);
        assert_eq!(turn.tool_results[0].tool_call_id, "call_1");
    }

    #[tokio::test]
    async fn tool_dispatch_order_matches_request_order() {
        let backend = MockBackend::new(vec![
            tool_use_response(&[
                ("call_1", "first"),
                ("call_2", "second"),
                ("call_3", "third"),
            ]),
            CompletionResponse::text_only("done"),
        ]);
        let toolset = MockToolset::new()
            .with_tool("first", ToolResult::text("1"))
            .with_tool("second", ToolResult::text("2"))
            .with_tool("third", ToolResult::text("3"));

        let agent = Agent::new(
            Arc::new(backend),
            Arc::new(toolset),
            AgentConfig::default(),
        );

        let history = Session::new();
        let turn = agent.turn(&history, "do three things").await.unwrap();

        // Transcript order equals dispatch order equals request order.
        let call_ids: Vec<&str> = turn.tool_calls.iter().map(|c| c.id.as_str()).collect();
        let result_ids: Vec<&str> = turn
            .tool_results
            .iter()
            .map(|r| r.tool_call_id.as_str())
            .collect();
        assert_eq!(call_ids, vec!["call_1", "call_2", "call_3"]);
        assert_eq!(result_ids, call_ids);
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_result_not_a_crash() {
        let backend = MockBackend::new(vec![
            tool_use_response(&[("call_1", "no_such_tool")]),
            CompletionResponse::text_only("I see that tool does not exist."),
        ]);

        let agent = make_agent(backend, MockToolset::new(), 25);
        let history = Session::new();
        let turn = agent.turn(&history, "use a made-up tool").await.unwrap();

        assert!(turn.is_success());
        assert!(!turn.tool_results[0].success);
        assert!(turn.tool_results[0].content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn iteration_bound_fails_the_turn() {
        let responses: Vec<CompletionResponse> = (0..10)
            .map(|i| tool_use_response(&[(&format!("call_{i}"), "spin")]))
            .collect();
        let backend = MockBackend::new(responses);
        let toolset = MockToolset::new().with_tool("spin", ToolResult::text("spun"));

        let agent = make_agent(backend, toolset, 3);
        let history = Session::new();
        let turn = agent.turn(&history, "spin forever").await.unwrap();

        assert!(!turn.is_success());
        assert!(matches!(
            turn.outcome,
            TurnOutcome::Failed(TurnFailure::IterationBound(3))
        ));
        // The bound counts model calls; the work done before the bound is
        // still recorded.
        assert_eq!(turn.tool_calls.len(), 3);
    }

    #[tokio::test]
    async fn terminal_model_error_fails_the_turn() {
        let backend = MockBackend::with_results(vec![MockResult::Error(LlmError::http(
            503,
            "model overloaded",
        ))]);

        let agent = make_agent(backend, MockToolset::new(), 25);
        let history = Session::new();
        let turn = agent.turn(&history, "hello").await.unwrap();

        assert!(matches!(
            &turn.outcome,
            TurnOutcome::Failed(TurnFailure::Model(msg)) if msg.contains("503")
        ));
    }

    #[tokio::test]
    async fn dead_tool_session_aborts_the_turn() {
        let backend = MockBackend::new(vec![tool_use_response(&[("call_1", "dead")])]);
        let toolset = MockToolset::new().with_fatal_tool("dead");

        let agent = make_agent(backend, toolset, 25);
        let history = Session::new();
        let result = agent.turn(&history, "poke the dead session").await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn history_is_replayed_into_requests() {
        let backend = MockBackend::new(vec![
            CompletionResponse::text_only("first answer"),
            CompletionResponse::text_only("second answer"),
        ]);
        let backend = Arc::new(backend);
        let agent = Agent::new(
            backend.clone(),
            Arc::new(MockToolset::new()),
            AgentConfig::default().with_system_prompt("You are a web automation agent."),
        );

        let mut history = Session::new();
        let turn = agent.turn(&history, "first instruction").await.unwrap();
        history.push_turn(turn);
        let turn = agent.turn(&history, "second instruction").await.unwrap();
        history.push_turn(turn);

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        // The second request replays the first exchange before the new
        // instruction.
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(
            requests[1].system.as_deref(),
            Some("You are a web automation agent.")
        );
    }
}
