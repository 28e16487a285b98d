//! User Notifier Daemon
//!
//! Emails every user in the directory once, on a recurring schedule.
//!
//! # Usage
//!
//! ```bash
//! notifier-daemon start [--foreground] [--interval-secs N]
//! notifier-daemon run-once
//! notifier-daemon stop
//! notifier-daemon status
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/user-notifier/config.toml)
//! 3. `--config` file
//! 4. Environment variables (NOTIFIER_*, `__` between sections)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use notifier_daemon::{run_once, show_status, start_daemon, stop_daemon, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            foreground,
            interval_secs,
        } => {
            start_daemon(
                cli.config.as_deref(),
                foreground,
                interval_secs,
                cli.log_level.as_deref(),
            )
            .await?;
        }
        Commands::Stop => {
            stop_daemon()?;
        }
        Commands::Status => {
            show_status()?;
        }
        Commands::RunOnce => {
            run_once(cli.config.as_deref(), cli.log_level.as_deref()).await?;
        }
    }

    Ok(())
}
