use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "sbrule",
    about = "Manage Azure Service Bus queue authorization rules from YAML declarations",
    version
)]
pub struct Cli {
    /// Which Service Bus to talk to.
    #[arg(long, default_value = "local", global = true)]
    pub cloud: CloudArg,

    /// State database. The local Service Bus keeps its rules next to it.
    #[arg(long, env = "SBRULE_STATE", default_value = ".sbrule/state.redb", global = true)]
    pub state: PathBuf,

    #[arg(long, env = "SBRULE_SUBSCRIPTION_ID", global = true)]
    pub subscription_id: Option<String>,

    #[arg(long, env = "AZURE_TENANT_ID", global = true)]
    pub tenant_id: Option<String>,

    /// Service principal client ID (optional; falls back to managed identity or the az CLI).
    #[arg(long, env = "AZURE_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub client_secret: Option<String>,

    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show what apply would change.
    Plan {
        /// Declaration file or directory.
        declarations: PathBuf,
    },

    /// Create, update, replace and delete rules to match the declarations.
    Apply {
        /// Declaration file or directory.
        declarations: PathBuf,
    },

    /// Re-read every tracked rule and record drift.
    Refresh {
        /// Read provider settings from this declaration file.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Start tracking an existing rule.
    Import {
        /// Address to track the rule under.
        address: String,
        /// Full resource id of the rule.
        id: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Delete tracked rules.
    Destroy {
        /// Address to destroy.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        address: Option<String>,
        /// Destroy every tracked rule.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print tracked state.
    Show {
        address: Option<String>,
        /// Print keys and connection strings instead of masking them.
        #[arg(long)]
        show_secrets: bool,
        #[arg(long)]
        json: bool,
    },

    /// Print the lifecycle event log.
    History {
        address: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CloudArg {
    /// File-backed stand-in, no credentials needed.
    Local,
    Azure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
