//! Caravel - browser automation driven by a reasoning engine.
//!
//! Main entry point for the Caravel CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{run, tools};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Caravel - browser automation driven by a reasoning engine
#[derive(Parser)]
#[command(name = "caravel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the automation session (scripted phase, then interactive)
    Run(run::RunArgs),

    /// List the tools the configured tool process advertises
    Tools(tools::ToolsArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing — console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "caravel=debug,caravel_agent=debug,caravel_llm=debug,caravel_mcp=debug,caravel_config=debug,info"
    } else {
        "caravel=info,caravel_agent=info,caravel_llm=info,caravel_mcp=info,warn"
    };

    let log_dir = dirs::data_local_dir()
        .map(|d| d.join("caravel").join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "caravel.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "caravel=trace,caravel_agent=trace,caravel_llm=trace,caravel_mcp=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Tools(args) => tools::run(args, &ctx).await,
    }
}
