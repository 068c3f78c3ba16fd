use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "customcrud",
    about = "Drive script-backed resources, data sources and leases from JSON files",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "CUSTOMCRUD_PARALLELISM",
        default_value_t = 0,
        help = "Maximum number of hook processes running at once (0 = unlimited)"
    )]
    pub(crate) parallelism: u32,

    #[arg(
        long = "high-precision-numbers",
        env = "CUSTOMCRUD_HIGH_PRECISION_NUMBERS",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Keep every significant digit of numbers instead of rounding to 64-bit floats"
    )]
    pub(crate) high_precision_numbers: bool,

    #[arg(
        long = "default-inputs",
        env = "CUSTOMCRUD_DEFAULT_INPUTS",
        help = "JSON object merged under every object's input"
    )]
    pub(crate) default_inputs: Option<String>,

    #[arg(
        long = "sensitive-default-inputs",
        env = "CUSTOMCRUD_SENSITIVE_DEFAULT_INPUTS",
        hide = true,
        hide_env_values = true,
        help = "JSON object of secret defaults; masked in all diagnostics"
    )]
    pub(crate) sensitive_default_inputs: Option<String>,

    #[arg(
        long = "timeout-ms",
        env = "CUSTOMCRUD_TIMEOUT_MS",
        help = "Cancel the running hook after this many milliseconds"
    )]
    pub(crate) timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CliCommand {
    /// Create, update or replace a resource to match its configuration.
    Apply {
        #[arg(long, help = "Resource configuration: {\"hooks\", \"input\", \"write_only_input\"}")]
        config: PathBuf,
        #[arg(long, help = "Resource state file")]
        state: PathBuf,
    },
    /// Run the read hook and refresh the stored state.
    Refresh {
        #[arg(long)]
        state: PathBuf,
    },
    /// Run the delete hook and remove the state file.
    Destroy {
        #[arg(long)]
        state: PathBuf,
    },
    /// Adopt an existing object from an import document.
    Import {
        #[arg(long, help = "Import JSON: {\"id\", \"hooks\", \"input\", \"output\"}")]
        spec: String,
        #[arg(long)]
        state: PathBuf,
    },
    /// Run a data source read hook and print its output.
    Data {
        #[arg(long, help = "Data source configuration: {\"hooks\", \"input\"}")]
        config: PathBuf,
    },
    /// Open a lease and record its private state.
    Open {
        #[arg(long, help = "Lease configuration: {\"hooks\", \"input\"}")]
        config: PathBuf,
        #[arg(long, help = "Private state file written for renew/close")]
        private: PathBuf,
    },
    /// Renew an open lease.
    Renew {
        #[arg(long)]
        private: PathBuf,
    },
    /// Close a lease; hook failures are only logged.
    Close {
        #[arg(long)]
        private: PathBuf,
    },
}
