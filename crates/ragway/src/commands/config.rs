//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};

use ragway_config::{GatewayConfig, resolve_credentials};
use ragway_llm::mask_secret;

use super::Context;
use crate::components;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
    }
}

/// Copy of `config` with plaintext secrets masked.
fn redacted(config: &GatewayConfig) -> GatewayConfig {
    let mut config = config.clone();
    if let Some(generation) = config.generation.as_mut() {
        generation.api_keys = generation.api_keys.iter().map(|k| mask_secret(k)).collect();
    }
    if let Some(store) = config.store.as_mut()
        && let Some(key) = store.service_key.as_mut()
    {
        *key = mask_secret(key);
    }
    config
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    let config = &loaded.config;

    println!("# ragway Configuration\n");

    // Sources
    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    // Credentials
    let generation = config.generation();
    let credentials = resolve_credentials(&generation);
    match &credentials.source {
        Some(source) => {
            println!("Credentials: {} from {}", credentials.keys.len(), source);
            for (i, key) in credentials.keys.iter().enumerate() {
                println!("  #{:<3} {}", i + 1, mask_secret(key));
            }
        }
        None => println!("Credentials: none (set {})", generation.credentials_env),
    }
    println!();

    // Models
    println!("Models (in preference order):");
    for model in components::model_list(config).iter() {
        println!("  {}", model);
    }
    println!();

    // Server settings
    let server = config.server();
    println!("Server:");
    println!("  bind: {}:{}", server.bind, server.port);
    if server.rate_limiting {
        println!("  rate limit: {} req/min", server.api_rpm);
    } else {
        println!("  rate limit: off");
    }
    println!("  auth: {:?}", config.auth().mode);
    println!();

    // Warnings
    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = redacted(config).to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");

    for source in &ctx.loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    Ok(())
}
