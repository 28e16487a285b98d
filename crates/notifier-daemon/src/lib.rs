//! Notifier daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (start, stop, status, run-once)
//! - `logging`: Console and rolling-file tracing setup
//! - `pid`: PID file handling

pub mod cli;
pub mod commands;
pub mod logging;
pub mod pid;

pub use cli::{Cli, Commands};
pub use commands::{
    build_email_job, format_summary, load_settings, run_batch, run_once, show_status,
    start_daemon, stop_daemon, RunOnceSummary,
};
