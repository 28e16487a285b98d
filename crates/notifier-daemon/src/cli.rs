//! CLI argument parsing for the notifier daemon.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// User Notifier Daemon
///
/// Emails every user in the directory exactly once, on a recurring schedule.
#[derive(Parser, Debug)]
#[command(name = "notifier-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/user-notifier/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the notifier daemon
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,

        /// Override the seconds between runs (ignores any configured cron)
        #[arg(short, long)]
        interval_secs: Option<u64>,
    },

    /// Stop the running daemon
    Stop,

    /// Show daemon status
    Status,

    /// Run a single batch now and exit
    RunOnce,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
