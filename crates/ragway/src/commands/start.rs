//! Start command - launches the gateway server.

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ragway_config::{env_lookup, resolve_credentials};
use ragway_server::{AppState, Server};

use super::Context;
use crate::components;

/// Arguments for the start command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    let config = &loaded.config;

    // Print warnings (plaintext keys, parse errors, etc.)
    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }
    for path in loaded.loaded_from() {
        info!(path = %path.display(), "Loaded config");
    }

    // ── Credentials ─────────────────────────────────────────────────────

    let generation = config.generation();
    let credentials = resolve_credentials(&generation);
    match &credentials.source {
        Some(source) => info!(count = credentials.keys.len(), source = %source, "Credential pool loaded"),
        None => warn!(
            env_var = %generation.credentials_env,
            "No API keys configured; chat requests will fail until keys are provided"
        ),
    }

    // ── Components ──────────────────────────────────────────────────────

    let orchestrator = components::build_orchestrator(config, &credentials)?;
    info!(
        models = ?orchestrator.models().iter().collect::<Vec<_>>(),
        "Model preference list"
    );

    let store = components::store_access(config, env_lookup)?;
    let gateway = components::build_gateway(config, orchestrator, &store)?;
    let validator = components::build_validator(config, &store, env_lookup)?;
    let server_config = components::server_config(config, args.port, args.bind.as_deref())?;

    // ── Shutdown ────────────────────────────────────────────────────────

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let state = AppState::new(server_config, gateway, validator).with_shutdown(shutdown);
    let server = Server::from_state(state);

    if !ctx.json_output {
        println!("ragway listening on http://{}", server.bind_address());
    }

    server.run().await?;
    Ok(())
}
