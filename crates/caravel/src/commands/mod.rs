//! CLI command handlers.

pub mod repl;
pub mod run;
pub mod tools;

use caravel_config::ToolSettings;
use caravel_mcp::ToolSessionConfig;

/// Shared context passed to command handlers.
pub struct Context {
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Build a tool session config from validated settings.
pub fn tool_session_config(settings: &ToolSettings) -> ToolSessionConfig {
    ToolSessionConfig::new("playwright", settings.command.as_str())
        .with_args(settings.args.clone())
        .with_launch_timeout(settings.launch_timeout)
        .with_call_timeout(settings.call_timeout)
}
