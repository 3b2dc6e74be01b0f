//! Instruction sources for the interactive phase.
//!
//! The orchestrator pulls instructions one at a time from an
//! [`InstructionSource`] until it returns `None`. The CLI implements this
//! over a readline prompt; [`QueueSource`] scripts it for tests and batch
//! runs.

use std::collections::VecDeque;

use async_trait::async_trait;

/// Tokens that terminate the interactive phase, matched case-insensitively.
const EXIT_TOKENS: &[&str] = &["exit", "quit"];

/// Whether a line is an exit token.
pub fn is_exit_token(line: &str) -> bool {
    let trimmed = line.trim();
    EXIT_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}

/// A source of interactive instructions.
#[async_trait]
pub trait InstructionSource: Send {
    /// The next instruction, or `None` when the input surface is done
    /// (exit token, end of input, or interrupt).
    async fn next_instruction(&mut self) -> Option<String>;
}

/// A fixed queue of instructions.
///
/// Empty lines are skipped and exit tokens end the source, mirroring the
/// interactive surface.
#[derive(Debug, Default)]
pub struct QueueSource {
    items: VecDeque<String>,
}

impl QueueSource {
    /// Create a source from a list of instructions.
    pub fn new(items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an empty source (interactive phase ends immediately).
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstructionSource for QueueSource {
    async fn next_instruction(&mut self) -> Option<String> {
        while let Some(line) = self.items.pop_front() {
            if is_exit_token(&line) {
                return None;
            }
            if line.trim().is_empty() {
                continue;
            }
            return Some(line);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_tokens_are_case_insensitive() {
        assert!(is_exit_token("exit"));
        assert!(is_exit_token("QUIT"));
        assert!(is_exit_token("  Exit  "));
        assert!(!is_exit_token("exit now"));
        assert!(!is_exit_token(""));
    }

    #[tokio::test]
    async fn queue_skips_blanks_and_stops_on_exit() {
        let mut source = QueueSource::new(["first", "", "   ", "second", "quit", "never seen"]);

        assert_eq!(source.next_instruction().await.as_deref(), Some("first"));
        assert_eq!(source.next_instruction().await.as_deref(), Some("second"));
        assert_eq!(source.next_instruction().await, None);
        assert_eq!(source.next_instruction().await, None);
    }

    #[tokio::test]
    async fn empty_queue_ends_immediately() {
        let mut source = QueueSource::empty();
        assert_eq!(source.next_instruction().await, None);
    }
}
