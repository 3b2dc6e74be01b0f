//! The `tools` command: spawn the tool process, print what it advertises,
//! and shut it down.

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};

use caravel_config::Settings;
use caravel_mcp::ToolSession;

use super::{Context, tool_session_config};

#[derive(Args)]
pub struct ToolsArgs {}

pub async fn run(_args: ToolsArgs, ctx: &Context) -> Result<()> {
    let settings = Settings::from_env().context("invalid startup configuration")?;

    let session = ToolSession::open(tool_session_config(&settings.tool))
        .await
        .context("failed to open tool session")?;

    let dim = Style::new().dim();
    if let Some(info) = session.server_info() {
        println!(
            "{} {}",
            style(&info.name).bold().cyan(),
            dim.apply_to(format!("v{}", info.version))
        );
    }
    println!();

    for tool in session.tools() {
        println!("  {}", style(&tool.name).bold());
        if let Some(description) = &tool.description {
            println!("    {}", dim.apply_to(description));
        }
        if ctx.verbose {
            if let Some(schema) = &tool.input_schema {
                println!("    {}", dim.apply_to(schema.to_string()));
            }
        }
    }
    println!();
    println!("{}", dim.apply_to(format!("{} tools", session.tools().len())));

    session.close().await?;
    Ok(())
}
