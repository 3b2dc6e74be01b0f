//! Core types for the agent crate.
//!
//! - [`Session`]: append-only conversation history
//! - [`Turn`]: one instruction-to-outcome cycle
//! - [`TurnOutcome`]: explicit success/failure value for a turn

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Session Id
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Call/Result Records
// ─────────────────────────────────────────────────────────────────────────────

/// A tool invocation requested by the model during a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id for this invocation.
    pub id: String,
    /// Name of the tool invoked.
    pub name: String,
    /// Arguments passed to the tool (JSON).
    pub arguments: serde_json::Value,
}

/// Result of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultRecord {
    /// Id of the tool call this answers.
    pub tool_call_id: String,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Output or error detail.
    pub content: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Why a turn failed. These are values, not exceptions: a failed turn is
/// recorded in history and the loop moves on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TurnFailure {
    /// The model request failed terminally (after retries).
    Model(String),
    /// The reasoning loop did not converge within the iteration bound.
    IterationBound(u32),
}

impl std::fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model(msg) => write!(f, "model request failed: {msg}"),
            Self::IterationBound(bound) => {
                write!(f, "no final response within {bound} reasoning iterations")
            }
        }
    }
}

/// The outcome of a resolved turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TurnOutcome {
    /// The model produced a final response.
    Completed {
        /// The final response text.
        text: String,
    },
    /// The turn failed; the failure is scoped to this turn only.
    Failed(TurnFailure),
}

impl TurnOutcome {
    /// Whether the turn completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The final response text, if the turn completed.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Completed { text } => Some(text),
            Self::Failed(_) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn
// ─────────────────────────────────────────────────────────────────────────────

/// One resolved conversation turn.
///
/// Turns enter history only once resolved, so every turn in a session has a
/// final outcome and history insertion order is completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Sequence index within the session, assigned at append time.
    pub index: u64,
    /// The instruction that started the turn.
    pub instruction: String,
    /// Tool invocations made while resolving the turn, in dispatch order.
    pub tool_calls: Vec<ToolCall>,
    /// Tool results, in the same order as the calls.
    pub tool_results: Vec<ToolResultRecord>,
    /// How the turn ended.
    pub outcome: TurnOutcome,
    /// Reasoning iterations used.
    pub iterations: u32,
    /// When the turn started.
    pub started_at: DateTime<Utc>,
    /// When the turn resolved.
    pub completed_at: DateTime<Utc>,
}

impl Turn {
    /// Build a completed turn.
    pub fn completed(
        instruction: impl Into<String>,
        text: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        tool_results: Vec<ToolResultRecord>,
        iterations: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            index: 0,
            instruction: instruction.into(),
            tool_calls,
            tool_results,
            outcome: TurnOutcome::Completed { text: text.into() },
            iterations,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Build a failed turn.
    pub fn failed(
        instruction: impl Into<String>,
        failure: TurnFailure,
        tool_calls: Vec<ToolCall>,
        tool_results: Vec<ToolResultRecord>,
        iterations: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            index: 0,
            instruction: instruction.into(),
            tool_calls,
            tool_results,
            outcome: TurnOutcome::Failed(failure),
            iterations,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Whether this turn completed successfully.
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Whether this turn invoked any tools.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// A conversation session: the append-only, ordered log of resolved turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session.
    pub id: SessionId,
    turns: Vec<Turn>,
    /// When this session was created.
    pub created_at: DateTime<Utc>,
    /// When this session last changed.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a resolved turn, assigning its sequence index.
    ///
    /// Indices are the append position, so they are strictly increasing
    /// with no gaps for the life of the session.
    pub fn push_turn(&mut self, mut turn: Turn) -> &Turn {
        turn.index = self.turns.len() as u64;
        self.updated_at = Utc::now();
        self.turns.push(turn);
        self.turns.last().unwrap()
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The most recent turn, if any.
    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of resolved turns.
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Whether the session has no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_turn(instruction: &str) -> Turn {
        Turn::completed(instruction, "ok", Vec::new(), Vec::new(), 1, Utc::now())
    }

    #[test]
    fn indices_are_strictly_increasing_with_no_gaps() {
        let mut session = Session::new();
        for i in 0..10 {
            session.push_turn(quick_turn(&format!("instruction {i}")));
        }

        let indices: Vec<u64> = session.turns().iter().map(|t| t.index).collect();
        assert_eq!(indices, (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn failed_turns_take_indices_too() {
        let mut session = Session::new();
        session.push_turn(quick_turn("first"));
        session.push_turn(Turn::failed(
            "second",
            TurnFailure::IterationBound(5),
            Vec::new(),
            Vec::new(),
            6,
            Utc::now(),
        ));
        session.push_turn(quick_turn("third"));

        let indices: Vec<u64> = session.turns().iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(!session.turns()[1].is_success());
    }

    #[test]
    fn outcome_text_accessor() {
        let turn = quick_turn("go");
        assert_eq!(turn.outcome.text(), Some("ok"));

        let failed = Turn::failed(
            "go",
            TurnFailure::Model("HTTP 503".into()),
            Vec::new(),
            Vec::new(),
            1,
            Utc::now(),
        );
        assert_eq!(failed.outcome.text(), None);
        assert!(
            matches!(&failed.outcome, TurnOutcome::Failed(TurnFailure::Model(m)) if m.contains("503"))
        );
    }

    #[test]
    fn session_serialization_round_trips() {
        let mut session = Session::new();
        session.push_turn(quick_turn("navigate to the login page"));

        let json = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, session.id);
        assert_eq!(restored.turn_count(), 1);
        assert_eq!(restored.turns()[0].instruction, "navigate to the login page");
    }

    #[test]
    fn failure_display_is_readable() {
        let failure = TurnFailure::IterationBound(25);
        assert!(failure.to_string().contains("25"));

        let failure = TurnFailure::Model("HTTP 503: overloaded".into());
        assert!(failure.to_string().contains("overloaded"));
    }
}
