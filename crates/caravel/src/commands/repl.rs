//! Interactive input surface and console output for the run command.

use async_trait::async_trait;
use console::{Style, style};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use tokio_util::sync::CancellationToken;

use caravel_agent::{InstructionSource, Turn, TurnObserver, is_exit_token};

// ─────────────────────────────────────────────────────────────────────────────
// Readline Source
// ─────────────────────────────────────────────────────────────────────────────

/// Line-oriented instruction source over a readline prompt.
///
/// Empty lines re-prompt, `exit`/`quit` (any case) end the phase, and
/// ctrl-c/ctrl-d end input through the cancellation path.
pub struct ReplSource {
    editor: Editor<(), DefaultHistory>,
    cancel: CancellationToken,
}

impl ReplSource {
    /// Create a new readline source.
    pub fn new(cancel: CancellationToken) -> anyhow::Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        Ok(Self {
            editor: Editor::with_config(config)?,
            cancel,
        })
    }
}

#[async_trait]
impl InstructionSource for ReplSource {
    async fn next_instruction(&mut self) -> Option<String> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            let prompt = format!("{} ", style("you>").cyan().bold());
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if is_exit_token(&line) {
                        return None;
                    }
                    return Some(line);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    println!();
                    return None;
                }
                Err(e) => {
                    print_error(&format!("input error: {e}"));
                    return None;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Console Observer
// ─────────────────────────────────────────────────────────────────────────────

/// Prints each resolved turn to the console.
pub struct ConsoleObserver {
    verbose: bool,
}

impl ConsoleObserver {
    /// Create a console observer.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TurnObserver for ConsoleObserver {
    fn on_turn(&mut self, turn: &Turn) {
        let dim = Style::new().dim();

        if self.verbose && turn.has_tool_calls() {
            for call in &turn.tool_calls {
                println!("{}", dim.apply_to(format!("[tool: {}]", call.name)));
            }
        }

        match turn.outcome.text() {
            Some(text) => {
                println!("{} {}", style("agent>").green().bold(), text);
                println!();
            }
            None => {
                print_error(&format!("turn {} failed: {}", turn.index, failure_text(turn)));
            }
        }
    }
}

fn failure_text(turn: &Turn) -> String {
    match &turn.outcome {
        caravel_agent::TurnOutcome::Failed(failure) => failure.to_string(),
        caravel_agent::TurnOutcome::Completed { .. } => String::new(),
    }
}

/// Print the session banner.
pub fn print_welcome() {
    let dim = Style::new().dim();
    println!();
    println!("{}", style("Caravel").bold().cyan());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!(
        "{}",
        dim.apply_to("Describe what the browser should do and press Enter.")
    );
    println!(
        "{}",
        dim.apply_to("Type 'exit' or 'quit' (or Ctrl+D) to end the session.")
    );
    println!();
}

/// Print an error line.
pub fn print_error(msg: &str) {
    let red = Style::new().red();
    println!("{} {}", red.apply_to("error:"), msg);
}
