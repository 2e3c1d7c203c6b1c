//! Keys command - credential diagnostics.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use console::{Style, style};

use ragway_config::resolve_credentials;
use ragway_llm::{AttemptOutcome, GenerationAttempt};

use super::Context;
use crate::components;

/// Arguments for the keys command.
#[derive(Args, Debug)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Try every key against every model and report which work
    Check {
        /// Prompt sent on each probe
        #[arg(long, default_value = "Reply with OK.")]
        prompt: String,
    },
}

/// Run the keys command.
pub async fn run(args: KeysArgs, ctx: &Context) -> Result<()> {
    match args.command {
        KeysCommand::Check { prompt } => cmd_check(&prompt, ctx).await,
    }
}

/// Short status label for an attempt.
fn outcome_label(outcome: &AttemptOutcome) -> String {
    match outcome {
        AttemptOutcome::Success => "ok".to_string(),
        AttemptOutcome::QuotaError(_) => "quota".to_string(),
        AttemptOutcome::OtherError(msg) => {
            let lower = msg.to_lowercase();
            if lower.contains("[404]") || lower.contains("not found") || lower.contains("not_found") {
                "not found".to_string()
            } else {
                format!("error: {}", msg.lines().next().unwrap_or_default())
            }
        }
    }
}

async fn cmd_check(prompt: &str, ctx: &Context) -> Result<()> {
    let config = &ctx.loaded.config;
    let credentials = resolve_credentials(&config.generation());
    if credentials.is_empty() {
        bail!(
            "No API keys configured. Set {} to a comma-separated list of keys.",
            config.generation().credentials_env
        );
    }

    let orchestrator = components::build_orchestrator(config, &credentials)?;
    let attempts = orchestrator.probe_all(prompt).await;
    let usable = attempts.iter().filter(|a| a.outcome.is_success()).count();

    if ctx.json_output {
        let rows: Vec<serde_json::Value> = attempts.iter().map(attempt_json).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "attempts": rows,
                "usable": usable,
            }))?
        );
    } else {
        print_table(&attempts, ctx.verbose);
        println!();
        println!(
            "{} of {} key/model combinations usable",
            usable,
            attempts.len()
        );
    }

    if usable == 0 {
        bail!("No usable key/model combination");
    }
    Ok(())
}

fn attempt_json(attempt: &GenerationAttempt) -> serde_json::Value {
    let error = match &attempt.outcome {
        AttemptOutcome::Success => None,
        AttemptOutcome::QuotaError(msg) | AttemptOutcome::OtherError(msg) => Some(msg.as_str()),
    };
    serde_json::json!({
        "key": attempt.credential_index + 1,
        "masked": attempt.credential,
        "model": attempt.model,
        "status": outcome_label(&attempt.outcome),
        "error": error,
    })
}

fn print_table(attempts: &[GenerationAttempt], verbose: bool) {
    let dim = Style::new().dim();
    let green = Style::new().green();
    let yellow = Style::new().yellow();
    let red = Style::new().red();

    println!();
    println!("{}", style("Key Check").bold());
    println!("{}", dim.apply_to("─".repeat(60)));

    for attempt in attempts {
        let label = outcome_label(&attempt.outcome);
        let status = match &attempt.outcome {
            AttemptOutcome::Success => green.apply_to(label),
            AttemptOutcome::QuotaError(_) => yellow.apply_to(label),
            AttemptOutcome::OtherError(_) => red.apply_to(label),
        };
        println!(
            "  #{:<3} {:<14} {:<26} {}",
            attempt.credential_index + 1,
            attempt.credential,
            attempt.model,
            status
        );
        if verbose
            && let (AttemptOutcome::QuotaError(msg) | AttemptOutcome::OtherError(msg)) =
                &attempt.outcome
        {
            println!("        {}", dim.apply_to(msg));
        }
    }
}
