mod bootstrap_helpers;
mod cli_args;
mod commands;
mod state_store;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use customcrud_exec::CancellationToken;
use customcrud_provider::{Provider, ProviderSettings};
use serde_json::Value;

use crate::{bootstrap_helpers::init_tracing, cli_args::Cli, commands::run_command};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let settings = ProviderSettings {
        parallelism: Some(cli.parallelism),
        high_precision_numbers: Some(cli.high_precision_numbers),
        default_inputs: parse_json_flag("--default-inputs", cli.default_inputs.as_deref())?,
        sensitive_default_inputs: parse_json_flag(
            "--sensitive-default-inputs",
            cli.sensitive_default_inputs.as_deref(),
        )?,
    };
    let provider = Provider::from_settings(&settings).context("invalid provider configuration")?;

    let root = CancellationToken::new();
    let cancel = match cli.timeout_ms {
        Some(timeout_ms) => root.with_timeout(Duration::from_millis(timeout_ms)),
        None => root.clone(),
    };
    let interrupt = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling running hook");
            interrupt.cancel();
        }
    });

    let rendered = run_command(&provider, cli.command, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

fn parse_json_flag(flag: &str, raw: Option<&str>) -> Result<Option<Value>> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    // serde_json errors can quote the offending value.
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|_| anyhow::anyhow!("{flag} must be valid JSON"))
}
