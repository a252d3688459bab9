mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, LogFormat};
use commands::Target;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    let target = Target::from_cli(&cli);

    match cli.command {
        Command::Plan { declarations } => commands::plan(&target, declarations).await,
        Command::Apply { declarations } => commands::apply(&target, declarations).await,
        Command::Refresh { file } => commands::refresh(&target, file).await,
        Command::Import { address, id, file } => commands::import(&target, address, id, file).await,
        Command::Destroy { address, all, file } => {
            commands::destroy(&target, address, all, file).await
        }
        Command::Show { address, show_secrets, json } => {
            commands::show(&target, address, show_secrets, json).await
        }
        Command::History { address, limit } => commands::history(&target, address, limit).await,
    }
}
