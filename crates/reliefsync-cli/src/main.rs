//! ReliefSync CLI - Command-line interface for ReliefSync
//!
//! Provides commands for:
//! - Pulling an incident's worksites into the local store
//! - Viewing per-category sync status
//! - Refreshing individual worksites
//! - Counting claims not yet uploaded
//! - Managing configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    claims::ClaimsCommand, completions::CompletionsCommand, config::ConfigCommand,
    refresh::RefreshCommand, status::StatusCommand, sync::SyncCommand, CommandEnv,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "reliefsync",
    version,
    about = "Offline-first worksite sync for disaster relief"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Pull an incident into the local store
    Sync(SyncCommand),
    /// Show sync status of an incident
    Status(StatusCommand),
    /// Re-pull specific worksites
    Refresh(RefreshCommand),
    /// Count claims not yet uploaded
    Claims(ClaimsCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let env = CommandEnv::new(format, cli.config.as_deref());

    let level = match cli.verbose {
        0 => env.load_config().logging.level,
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(&env).await,
        Commands::Status(cmd) => cmd.execute(&env).await,
        Commands::Refresh(cmd) => cmd.execute(&env).await,
        Commands::Claims(cmd) => cmd.execute(&env).await,
        Commands::Config(cmd) => cmd.execute(&env).await,
        Commands::Completions(cmd) => cmd.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["reliefsync", "status", "151", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_config_set_parses() {
        let cli =
            Cli::try_parse_from(["reliefsync", "config", "set", "sync.page_size", "60"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommand::Set { .. })
        ));
    }
}
