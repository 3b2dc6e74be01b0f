//! The phase-driven orchestrator.
//!
//! [`Orchestrator::run`] drives a session through its phases:
//!
//! ```text
//! Init → Scripted → Interactive → ShuttingDown → Terminated
//! ```
//!
//! The scripted phase replays a fixed instruction list in order; the
//! interactive phase pulls instructions from an [`InstructionSource`] until
//! it is exhausted. A failed turn is recorded and the loop continues; only a
//! dead tool session or cancellation ends the run early — and every path,
//! including those, goes through shutdown, which closes the tool session
//! exactly once.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::error::{AgentError, Result};
use crate::source::InstructionSource;
use crate::tool::SharedToolset;
use crate::types::{Session, Turn};

// ─────────────────────────────────────────────────────────────────────────────
// Phases & Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Orchestrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Scripted,
    Interactive,
    ShuttingDown,
    Terminated,
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Instructions replayed before the interactive phase.
    pub scripted: Vec<String>,
    /// How long an in-flight turn may keep running after cancellation.
    pub grace_period: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scripted: Vec::new(),
            grace_period: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    /// Set the scripted instruction list.
    pub fn with_scripted(mut self, scripted: Vec<String>) -> Self {
        self.scripted = scripted;
        self
    }

    /// Set the cancellation grace period.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observer & Summary
// ─────────────────────────────────────────────────────────────────────────────

/// Output surface for resolved turns.
pub trait TurnObserver: Send {
    /// Called once per resolved turn, after it entered history.
    fn on_turn(&mut self, turn: &Turn) {
        let _ = turn;
    }
}

/// Observer that discards everything.
pub struct NullObserver;

impl TurnObserver for NullObserver {}

/// What a run did, for the caller's exit handling.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Turns that completed with a final response.
    pub completed_turns: usize,
    /// Turns recorded with a failure outcome.
    pub failed_turns: usize,
    /// Whether the run was ended by cancellation.
    pub interrupted: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Drives the scripted and interactive phases over one agent and one tool
/// session.
pub struct Orchestrator {
    agent: Agent,
    toolset: SharedToolset,
    history: Session,
    config: OrchestratorConfig,
    cancel: CancellationToken,
    phase: Phase,
}

impl Orchestrator {
    /// Create an orchestrator.
    ///
    /// `toolset` must be the same set the agent dispatches through — the
    /// orchestrator owns its teardown.
    pub fn new(
        agent: Agent,
        toolset: SharedToolset,
        config: OrchestratorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            agent,
            toolset,
            history: Session::new(),
            config,
            cancel,
            phase: Phase::Init,
        }
    }

    /// The conversation history.
    pub fn history(&self) -> &Session {
        &self.history
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the scripted phase, then the interactive phase, then shut down.
    ///
    /// Returns the run summary; `Err` only for fatal faults (dead tool
    /// session). Shutdown — closing the tool session — happens on every
    /// path out of this method.
    pub async fn run(
        &mut self,
        source: &mut dyn InstructionSource,
        observer: &mut dyn TurnObserver,
    ) -> Result<RunSummary> {
        let outcome = self.drive(source, observer).await;

        self.phase = Phase::ShuttingDown;
        if let Err(e) = self.toolset.close().await {
            tracing::warn!(error = %e, "tool session teardown reported an error");
        }
        self.phase = Phase::Terminated;

        match outcome {
            Ok(()) => Ok(self.summary(false)),
            Err(AgentError::Cancelled) => {
                tracing::info!("run interrupted by cancellation");
                Ok(self.summary(true))
            }
            Err(e) => {
                tracing::error!(error = %e, "run ended by fatal error");
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        source: &mut dyn InstructionSource,
        observer: &mut dyn TurnObserver,
    ) -> Result<()> {
        self.phase = Phase::Scripted;
        let scripted = self.config.scripted.clone();
        tracing::info!(instructions = scripted.len(), "scripted phase started");

        for instruction in &scripted {
            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            // A failed turn is recorded and the phase continues with the
            // next scripted instruction.
            self.run_turn(instruction, observer).await?;
        }

        self.phase = Phase::Interactive;
        tracing::info!("interactive phase started");

        loop {
            let instruction = tokio::select! {
                _ = self.cancel.cancelled() => return Err(AgentError::Cancelled),
                next = source.next_instruction() => next,
            };

            let Some(instruction) = instruction else {
                return Ok(());
            };

            self.run_turn(&instruction, observer).await?;
        }
    }

    /// Resolve one instruction and record the result.
    ///
    /// The turn races the cancellation token: once cancellation fires, the
    /// in-flight work gets the grace period to finish, after which it is
    /// abandoned without entering history.
    async fn run_turn(
        &mut self,
        instruction: &str,
        observer: &mut dyn TurnObserver,
    ) -> Result<()> {
        let grace = self.config.grace_period;

        let resolved = {
            let turn_fut = self.agent.turn(&self.history, instruction);
            tokio::pin!(turn_fut);

            tokio::select! {
                resolved = &mut turn_fut => resolved,
                _ = self.cancel.cancelled() => {
                    match tokio::time::timeout(grace, &mut turn_fut).await {
                        Ok(resolved) => resolved,
                        Err(_) => {
                            tracing::warn!(
                                grace_ms = grace.as_millis() as u64,
                                "in-flight turn abandoned after grace period"
                            );
                            return Err(AgentError::Cancelled);
                        }
                    }
                }
            }
        };

        let turn = self.history.push_turn(resolved?);
        if !turn.is_success() {
            tracing::warn!(index = turn.index, "turn recorded with failure outcome");
        }
        observer.on_turn(turn);
        Ok(())
    }

    fn summary(&self, interrupted: bool) -> RunSummary {
        let completed = self.history.turns().iter().filter(|t| t.is_success()).count();
        RunSummary {
            completed_turns: completed,
            failed_turns: self.history.turn_count() - completed,
            interrupted,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use caravel_llm::{CompletionResponse, ContentBlock, LlmError, MockBackend, MockResult};

    use crate::agent::AgentConfig;
    use crate::source::QueueSource;
    use crate::tool::{MockToolset, ToolResult};
    use crate::types::{TurnFailure, TurnOutcome};

    fn tool_use(id: &str, name: &str) -> CompletionResponse {
        CompletionResponse::new(vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input: serde_json::json!({}),
        }])
    }

    struct Capture(Vec<String>);

    impl TurnObserver for Capture {
        fn on_turn(&mut self, turn: &Turn) {
            self.0
                .push(turn.outcome.text().unwrap_or("<failed>").to_string());
        }
    }

    fn orchestrator(
        backend: MockBackend,
        toolset: Arc<MockToolset>,
        config: OrchestratorConfig,
        max_iterations: u32,
    ) -> Orchestrator {
        let agent = Agent::new(
            Arc::new(backend),
            toolset.clone(),
            AgentConfig::default().with_max_iterations(max_iterations),
        );
        Orchestrator::new(agent, toolset, config, CancellationToken::new())
    }

    #[tokio::test]
    async fn scripted_then_interactive_in_order() {
        let backend = MockBackend::new(vec![
            CompletionResponse::text_only("scripted one"),
            CompletionResponse::text_only("scripted two"),
            CompletionResponse::text_only("interactive one"),
        ]);
        let toolset = Arc::new(MockToolset::new());
        let config = OrchestratorConfig::default()
            .with_scripted(vec!["step 1".into(), "step 2".into()]);

        let mut orch = orchestrator(backend, toolset.clone(), config, 25);
        let mut source = QueueSource::new(["ask something", "exit"]);
        let mut capture = Capture(Vec::new());

        let summary = orch.run(&mut source, &mut capture).await.unwrap();

        assert_eq!(summary.completed_turns, 3);
        assert_eq!(summary.failed_turns, 0);
        assert!(!summary.interrupted);
        assert_eq!(
            capture.0,
            vec!["scripted one", "scripted two", "interactive one"]
        );

        // Teardown ran exactly once.
        assert_eq!(toolset.close_count(), 1);

        // History indices are gap-free across both phases.
        let indices: Vec<u64> = orch.history().turns().iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(orch.phase(), Phase::Terminated);
    }

    #[tokio::test]
    async fn scripted_phase_survives_failed_turns() {
        // First scripted turn exhausts the iteration bound, second succeeds.
        let backend = MockBackend::new(vec![
            tool_use("call_0", "spin"),
            tool_use("call_1", "spin"),
            CompletionResponse::text_only("recovered"),
        ]);
        let toolset =
            Arc::new(MockToolset::new().with_tool("spin", ToolResult::text("spun")));
        let config = OrchestratorConfig::default()
            .with_scripted(vec!["spin forever".into(), "just answer".into()]);

        let mut orch = orchestrator(backend, toolset.clone(), config, 2);
        let mut source = QueueSource::empty();

        let summary = orch
            .run(&mut source, &mut NullObserver)
            .await
            .unwrap();

        assert_eq!(summary.completed_turns, 1);
        assert_eq!(summary.failed_turns, 1);

        let turns = orch.history().turns();
        assert!(matches!(
            turns[0].outcome,
            TurnOutcome::Failed(TurnFailure::IterationBound(2))
        ));
        assert_eq!(turns[1].outcome.text(), Some("recovered"));
        assert_eq!(toolset.close_count(), 1);
    }

    #[tokio::test]
    async fn model_failure_is_turn_scoped() {
        let backend = MockBackend::with_results(vec![
            MockResult::Error(LlmError::http(503, "overloaded")),
            MockResult::Success(CompletionResponse::text_only("back online")),
        ]);
        let toolset = Arc::new(MockToolset::new());
        let config = OrchestratorConfig::default()
            .with_scripted(vec!["first".into(), "second".into()]);

        let mut orch = orchestrator(backend, toolset, config, 25);
        let summary = orch
            .run(&mut QueueSource::empty(), &mut NullObserver)
            .await
            .unwrap();

        assert_eq!(summary.failed_turns, 1);
        assert_eq!(summary.completed_turns, 1);
        assert!(matches!(
            &orch.history().turns()[0].outcome,
            TurnOutcome::Failed(TurnFailure::Model(msg)) if msg.contains("503")
        ));
    }

    #[tokio::test]
    async fn dead_tool_session_is_fatal_but_still_tears_down() {
        let backend = MockBackend::new(vec![tool_use("call_0", "dead")]);
        let toolset = Arc::new(MockToolset::new().with_fatal_tool("dead"));
        let config = OrchestratorConfig::default().with_scripted(vec!["poke".into()]);

        let mut orch = orchestrator(backend, toolset.clone(), config, 25);
        let result = orch.run(&mut QueueSource::empty(), &mut NullObserver).await;

        assert!(result.is_err());
        assert_eq!(toolset.close_count(), 1);
        assert_eq!(orch.phase(), Phase::Terminated);
    }

    #[tokio::test]
    async fn pre_cancelled_run_goes_straight_to_teardown() {
        let backend = MockBackend::with_text("never seen");
        let toolset = Arc::new(MockToolset::new());
        let config = OrchestratorConfig::default().with_scripted(vec!["step".into()]);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let agent = Agent::new(Arc::new(backend), toolset.clone(), AgentConfig::default());
        let mut orch = Orchestrator::new(agent, toolset.clone(), config, cancel);

        let summary = orch
            .run(&mut QueueSource::empty(), &mut NullObserver)
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert!(orch.history().is_empty());
        assert_eq!(toolset.close_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_mid_turn_abandons_after_grace() {
        // The tool takes 500ms; cancellation arrives at ~50ms with a 100ms
        // grace period, so the turn is abandoned and never enters history.
        let backend = MockBackend::new(vec![
            tool_use("call_0", "slow"),
            CompletionResponse::text_only("never reached"),
        ]);
        let toolset = Arc::new(
            MockToolset::new()
                .with_tool("slow", ToolResult::text("done"))
                .with_delay(Duration::from_millis(500)),
        );
        let config = OrchestratorConfig::default()
            .with_scripted(vec!["slow task".into()])
            .with_grace_period(Duration::from_millis(100));

        let cancel = CancellationToken::new();
        let agent = Agent::new(
            Arc::new(backend),
            toolset.clone(),
            AgentConfig::default(),
        );
        let mut orch = Orchestrator::new(agent, toolset.clone(), config, cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let summary = orch
            .run(&mut QueueSource::empty(), &mut NullObserver)
            .await
            .unwrap();
        canceller.await.unwrap();

        assert!(summary.interrupted);
        assert!(orch.history().is_empty(), "abandoned turn must not enter history");
        assert_eq!(toolset.close_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_lets_a_fast_turn_finish_within_grace() {
        // The tool takes 100ms; cancellation arrives at ~20ms with a 2s
        // grace period, so the in-flight turn completes and is recorded
        // before shutdown.
        let backend = MockBackend::new(vec![
            tool_use("call_0", "quick"),
            CompletionResponse::text_only("made it"),
        ]);
        let toolset = Arc::new(
            MockToolset::new()
                .with_tool("quick", ToolResult::text("ok"))
                .with_delay(Duration::from_millis(100)),
        );
        let config = OrchestratorConfig::default()
            .with_scripted(vec!["quick task".into()])
            .with_grace_period(Duration::from_secs(2));

        let cancel = CancellationToken::new();
        let agent = Agent::new(
            Arc::new(backend),
            toolset.clone(),
            AgentConfig::default(),
        );
        let mut orch = Orchestrator::new(agent, toolset.clone(), config, cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let summary = orch
            .run(&mut QueueSource::empty(), &mut NullObserver)
            .await
            .unwrap();
        canceller.await.unwrap();

        assert!(summary.interrupted);
        assert_eq!(orch.history().turn_count(), 1);
        assert_eq!(orch.history().turns()[0].outcome.text(), Some("made it"));
        assert_eq!(toolset.close_count(), 1);
    }

    #[tokio::test]
    async fn interactive_phase_ends_on_source_exhaustion() {
        let backend = MockBackend::with_text("only answer");
        let toolset = Arc::new(MockToolset::new());

        let mut orch = orchestrator(backend, toolset, OrchestratorConfig::default(), 25);
        let mut source = QueueSource::new(["one question"]);

        let summary = orch.run(&mut source, &mut NullObserver).await.unwrap();
        assert_eq!(summary.completed_turns, 1);
        assert!(!summary.interrupted);
    }
}
