//! The `run` command: scripted phase, then interactive phase.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use caravel_agent::{
    Agent, AgentConfig, InstructionSource, McpToolset, Orchestrator, OrchestratorConfig,
    QueueSource, SharedToolset,
};
use caravel_config::Settings;
use caravel_llm::{GeminiBackend, GeminiConfig, RetryPolicy};
use caravel_mcp::ToolSession;

use super::repl::{ConsoleObserver, ReplSource, print_welcome};
use super::{Context, tool_session_config};

/// Instruction given to the model for every request.
const SYSTEM_PROMPT: &str = "You are a helpful web automation agent. Use the browser tools to \
     navigate through web pages and achieve the requested objective.";

#[derive(Args)]
pub struct RunArgs {
    /// Script file with one instruction per line ('#' starts a comment)
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Stop after the scripted phase instead of prompting for input
    #[arg(long)]
    pub batch: bool,
}

pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    // Configuration errors abort here, before any process is spawned.
    let settings = Settings::from_env().context("invalid startup configuration")?;
    let scripted = load_script(args.script.as_deref())?;

    let retry = build_retry_policy(&settings);
    let gemini = GeminiBackend::new(
        GeminiConfig::new(settings.llm.api_key.as_str())
            .with_model(settings.llm.model.as_str())
            .with_sampling(settings.llm.temperature, settings.llm.top_p, settings.llm.top_k)
            .with_retry(retry),
    )?;

    tracing::info!(
        command = %settings.tool.command,
        args = ?settings.tool.args,
        "launching tool process"
    );
    let session = Arc::new(
        ToolSession::open(tool_session_config(&settings.tool))
            .await
            .context("failed to open tool session")?,
    );
    let toolset: SharedToolset = Arc::new(McpToolset::new(session));

    let agent = Agent::new(
        Arc::new(gemini),
        toolset.clone(),
        AgentConfig::default().with_system_prompt(SYSTEM_PROMPT),
    );

    // Ctrl+C routes through the cancellation token, never straight to exit:
    // the orchestrator owns teardown.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                cancel.cancel();
            }
        });
    }

    let mut orchestrator = Orchestrator::new(
        agent,
        toolset,
        OrchestratorConfig::default().with_scripted(scripted),
        cancel.clone(),
    );

    print_welcome();

    let mut observer = ConsoleObserver::new(ctx.verbose);
    let mut source: Box<dyn InstructionSource> = if args.batch {
        Box::new(QueueSource::empty())
    } else {
        Box::new(ReplSource::new(cancel)?)
    };

    let summary = orchestrator
        .run(source.as_mut(), &mut observer)
        .await
        .context("session ended with a fatal error")?;

    if summary.interrupted {
        anyhow::bail!(
            "session interrupted ({} completed, {} failed turns)",
            summary.completed_turns,
            summary.failed_turns
        );
    }

    println!(
        "Session ended: {} completed, {} failed turns.",
        summary.completed_turns, summary.failed_turns
    );
    Ok(())
}

fn build_retry_policy(settings: &Settings) -> RetryPolicy {
    let mut policy = RetryPolicy::new(
        settings.retry.max_attempts,
        settings.retry.backoff_base,
        settings.retry.initial_delay,
    )
    .with_jitter(settings.retry.jitter)
    .with_retryable_codes(settings.retry.retryable_status_codes.iter().copied());

    if let Some(max_delay) = settings.retry.max_delay {
        policy = policy.with_max_delay(max_delay);
    }
    policy
}

/// Load scripted instructions: one per line, blanks and '#' comments
/// skipped.
fn load_script(path: Option<&std::path::Path>) -> Result<Vec<String>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script '{}'", path.display()))?;

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn no_script_means_empty_phase() {
        assert!(load_script(None).unwrap().is_empty());
    }

    #[test]
    fn script_skips_blanks_and_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# login flow").unwrap();
        writeln!(file, "navigate to https://example.com/login").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  enter the credentials and sign in  ").unwrap();

        let script = load_script(Some(file.path())).unwrap();
        assert_eq!(
            script,
            vec![
                "navigate to https://example.com/login",
                "enter the credentials and sign in"
            ]
        );
    }

    #[test]
    fn missing_script_is_an_error() {
        assert!(load_script(Some(std::path::Path::new("/no/such/script.txt"))).is_err());
    }
}
