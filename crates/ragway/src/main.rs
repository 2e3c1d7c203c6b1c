//! ragway - grounded chat gateway
//!
//! Main entry point for the ragway CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod components;

use commands::{config, keys, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// ragway - retrieval-augmented chat gateway
#[derive(Parser)]
#[command(name = "ragway")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to config file (overrides default discovery)
    #[arg(long, global = true, env = "RAGWAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Start(start::StartArgs),

    /// Credential diagnostics
    Keys(keys::KeysArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = commands::load(cli.config.as_deref())?;

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "ragway=debug,ragway_llm=debug,ragway_retrieval=debug,ragway_server=debug,ragway_config=debug,info"
    } else {
        "ragway=info,ragway_llm=info,ragway_retrieval=info,ragway_server=info,warn"
    };

    let log_dir = loaded
        .config
        .logging()
        .dir
        .or_else(|| ragway_config::user_config_dir().map(|d| d.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ragway.log");
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
                    "ragway=trace,ragway_llm=trace,ragway_retrieval=trace,ragway_server=trace,ragway_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        loaded,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Keys(args) => keys::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
