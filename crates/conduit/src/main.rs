//! Conduit - MCP client with LLM tool calling
//!
//! Main entry point for the Conduit CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

mod approval;
mod commands;

use commands::{ask, call, chat, tools};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Conduit - MCP client with LLM tool calling
#[derive(Parser)]
#[command(name = "conduit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config directory (default: platform config dir + /conduit)
    #[arg(long, global = true, env = "CONDUIT_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// MCP server URL (overrides [server] url)
    #[arg(long, global = true, env = "CONDUIT_SERVER_URL")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tools and resources the server offers
    Tools(tools::ToolsArgs),

    /// Invoke one capability directly
    Call(call::CallArgs),

    /// Ask a one-shot question
    Ask(ask::AskArgs),

    /// Enter interactive chat mode (REPL)
    Chat(chat::ChatArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.clone().or_else(conduit_config::user_config_dir);

    // Initialize tracing: console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "conduit=debug,conduit_mcp=debug,conduit_agent=debug,conduit_config=debug,info"
    } else {
        "conduit=info,conduit_mcp=warn,conduit_agent=warn,conduit_config=warn,warn"
    };

    let log_dir = config_dir
        .as_ref()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "conduit.log");
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
                    "conduit=trace,conduit_mcp=trace,conduit_agent=trace,conduit_config=trace,info",
                )),
        )
        .init();

    let loaded = conduit_config::load_config(config_dir.as_deref(), Path::new("."))
        .context("failed to load configuration")?;
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    for path in &loaded.loaded {
        tracing::debug!(path = %path.display(), "loaded config");
    }
    loaded.config.validate()?;

    let server_url = cli
        .server
        .unwrap_or_else(|| loaded.config.server().url.clone());

    let ctx = commands::Context {
        config: loaded.config,
        config_dir,
        server_url,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Tools(args) => tools::run(args, &ctx),
        Commands::Call(args) => call::run(args, &ctx),
        Commands::Ask(args) => ask::run(args, &ctx),
        Commands::Chat(args) => chat::run(args, &ctx),
    }
}
