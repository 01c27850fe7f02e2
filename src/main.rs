mod args;
mod cmd_completions;
mod cmd_config;
mod cmd_daemon;
mod cmd_debug;
mod cmd_geoip;
mod cmd_stats;
mod cmd_upgrade;

use args::{Cli, Commands};
use clap::Parser;
use oxiwatch::logging;

/// Log level for one-shot commands; the daemon uses the configured level.
const COMMAND_LOG_LEVEL: &str = "warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Daemon) {
        logging::init(COMMAND_LOG_LEVEL);
    }

    match cli.command {
        Commands::Daemon => cmd_daemon::cmd_daemon().await?,
        Commands::Stats { command } => cmd_stats::cmd_stats(command).await?,
        Commands::Geoip { command } => cmd_geoip::cmd_geoip(command).await?,
        Commands::Cleanup => cmd_stats::cmd_cleanup().await?,
        Commands::Config { command } => cmd_config::cmd_config(command).await?,
        Commands::SendTest => cmd_config::cmd_send_test().await?,
        Commands::Upgrade { check } => cmd_upgrade::cmd_upgrade(check).await?,
        Commands::Debug { command } => cmd_debug::cmd_debug(command)?,
        Commands::Completions { shell } => cmd_completions::cmd_completions(shell),
    }

    Ok(())
}
