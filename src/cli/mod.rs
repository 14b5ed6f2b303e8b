//! Command-line interface definitions.

pub mod board;
pub mod check;
pub mod output;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::app::Config;
use crate::error::Result;

/// Riskboard - trading-competition leaderboard with drawdown freezes.
#[derive(Parser, Debug)]
#[command(name = "riskboard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Override log level (debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the risk desk until Ctrl+C
    Run(RunArgs),

    /// Print the ranked leaderboard of a group
    Leaderboard(LeaderboardArgs),

    /// List frozen accounts
    Frozen(JsonArg),

    /// Release one frozen account
    Unfreeze(UnfreezeArgs),

    /// Release every frozen account
    UnfreezeAll,

    /// Validate the configuration file
    Check,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Use JSON log format instead of pretty
    #[arg(long)]
    pub json_logs: bool,
}

/// Arguments for the `leaderboard` subcommand.
#[derive(Parser, Debug)]
pub struct LeaderboardArgs {
    /// Group identifier
    pub group: String,

    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Shared argument for commands that can emit JSON.
#[derive(Parser, Debug)]
pub struct JsonArg {
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `unfreeze` subcommand.
#[derive(Parser, Debug)]
pub struct UnfreezeArgs {
    /// Group identifier
    pub group: String,

    /// Account identifier
    pub account: String,
}

/// Dispatch a parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    if matches!(cli.command, Commands::Check) {
        return check::execute(&cli.config);
    }

    let mut config = Config::load(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    match cli.command {
        Commands::Run(args) => run::execute(config, &args).await,
        Commands::Leaderboard(args) => board::leaderboard(&config, &args).await,
        Commands::Frozen(args) => board::frozen(&config, args.json).await,
        Commands::Unfreeze(args) => board::unfreeze(&config, &args).await,
        Commands::UnfreezeAll => board::unfreeze_all(&config).await,
        Commands::Check => Ok(()),
    }
}
