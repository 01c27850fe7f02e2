use clap::{Parser, Subcommand};
use oxiwatch::completions::CompletionShell;

#[derive(Parser)]
#[command(name = "oxiwatch")]
#[command(version)]
#[command(about = "SSH login monitor with Telegram alerts", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Follow the SSH journal and alert on logins (runs in the foreground)
    Daemon,

    /// Query stored login events
    Stats {
        #[command(subcommand)]
        command: Option<StatsCommands>,
    },

    /// Manage the GeoIP database
    Geoip {
        #[command(subcommand)]
        command: GeoipCommands,
    },

    /// Delete events older than the retention period
    Cleanup,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Send a test message to the configured Telegram chat
    SendTest,

    /// Update oxiwatch to the latest release
    Upgrade {
        /// Only report whether an update is available
        #[arg(long)]
        check: bool,
    },

    /// Troubleshooting helpers
    Debug {
        #[command(subcommand)]
        command: DebugCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub(crate) enum StatsCommands {
    /// Today's login summary (default)
    Today,

    /// Overall numbers for the last N days
    Report {
        #[arg(short, long, default_value = "1")]
        days: u32,
    },

    /// Successful logins in the last N days
    Logins {
        #[arg(short, long, default_value = "7")]
        days: u32,
    },
}

#[derive(Subcommand)]
pub(crate) enum GeoipCommands {
    /// Download the newest published database
    Update,

    /// Show the local database and whether it is current
    Status,

    /// Resolve an IP address against the local database
    Lookup {
        ip: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigCommands {
    /// Check that the daemon could start with the current configuration
    Validate,

    /// Print the effective configuration with secrets masked
    Show,
}

#[derive(Subcommand)]
pub(crate) enum DebugCommands {
    /// Parse an sshd message (or full syslog line) and print the event
    Parse {
        /// The log line to parse
        line: String,
    },
}
