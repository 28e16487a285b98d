//! Command implementations for the notifier daemon.
//!
//! Handles:
//! - start: Load config, build the email job, run the scheduler until a signal
//! - stop: Signal running daemon to stop (via PID file)
//! - status: Check if daemon is running
//! - run-once: Execute a single batch in the foreground

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use notifier_directory::{HttpDirectoryConfig, HttpUserDirectory, UserDirectory};
use notifier_mail::{Mailer, SmtpMailer, SmtpMailerConfig};
use notifier_scheduler::jobs::email::{register_email_job, BatchReport, EmailJob, MailContent};
use notifier_scheduler::{JobSchedule, SchedulerConfig, SchedulerService, TracingListener};
use notifier_types::{CompletionFlag, Settings, User};

use crate::logging::init_logging;
use crate::pid::{is_process_running, PidFile};

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    interval_override: Option<u64>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    apply_overrides(&mut settings, log_level_override, interval_override);
    settings
        .validate()
        .context("Invalid configuration after CLI overrides")?;
    Ok(settings)
}

/// An explicit interval replaces any configured cron schedule.
pub fn apply_overrides(
    settings: &mut Settings,
    log_level: Option<&str>,
    interval_secs: Option<u64>,
) {
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    if let Some(secs) = interval_secs {
        settings.schedule.interval_secs = secs;
        settings.schedule.cron = None;
    }
}

/// Wire the email job to its collaborators as configured.
pub fn build_email_job(
    settings: &Settings,
    directory: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    completion: CompletionFlag,
) -> EmailJob {
    EmailJob::new(directory, mailer, completion)
        .with_content(MailContent::from_settings(&settings.mail))
        .with_reset_on_pending(settings.completion.reset_on_pending)
}

fn connect(settings: &Settings) -> Result<(Arc<dyn UserDirectory>, Arc<dyn Mailer>)> {
    let directory: Arc<dyn UserDirectory> = Arc::new(
        HttpUserDirectory::new(HttpDirectoryConfig::from_settings(&settings.directory))
            .context("Failed to create directory client")?,
    );
    let mailer: Arc<dyn Mailer> = Arc::new(
        SmtpMailer::new(SmtpMailerConfig::from_settings(&settings.smtp, &settings.mail))
            .context("Failed to create SMTP mailer")?,
    );
    Ok((directory, mailer))
}

/// Start the notifier daemon.
///
/// 1. Load configuration (defaults -> file -> env -> CLI)
/// 2. Build the directory client, mailer and email job
/// 3. Start the scheduler; the first batch runs immediately
/// 4. On SIGINT/SIGTERM, stop ticking and wait for the in-flight batch
pub async fn start_daemon(
    config_path: Option<&str>,
    foreground: bool,
    interval_override: Option<u64>,
    log_level_override: Option<&str>,
) -> Result<()> {
    let settings = load_settings(config_path, log_level_override, interval_override)?;
    let _log_guard = init_logging(&settings.log_level, settings.log_dir.as_deref().map(Path::new))?;

    let schedule = JobSchedule::from_settings(&settings.schedule);
    info!("Notifier daemon starting...");
    info!("Configuration:");
    info!("  Schedule: {}", schedule);
    info!("  Directory: {}", settings.directory.base_url);
    info!("  SMTP relay: {}:{}", settings.smtp.host, settings.smtp.port);
    info!("  Log level: {}", settings.log_level);

    if !foreground {
        warn!("Background mode not implemented, running in foreground");
        warn!("Use a process manager (systemd, launchd) for background operation");
    }

    let (directory, mailer) = connect(&settings)?;
    let completion = CompletionFlag::new();

    let mut scheduler = SchedulerService::new(SchedulerConfig::from_settings(&settings.schedule))
        .await
        .context("Failed to create scheduler")?;
    scheduler.add_listener(Arc::new(TracingListener));

    let job = build_email_job(&settings, directory, mailer, completion.clone());
    register_email_job(&scheduler, job, schedule)
        .await
        .context("Failed to register email job")?;

    let pid_file = PidFile::default_location();
    pid_file.write()?;

    let result = run_until_signal(&mut scheduler).await;

    pid_file.remove();
    info!(completed = completion.is_complete(), "Notifier daemon stopped");

    result
}

async fn run_until_signal(scheduler: &mut SchedulerService) -> Result<()> {
    scheduler
        .start()
        .await
        .context("Failed to start scheduler")?;

    shutdown_signal().await;

    scheduler
        .shutdown()
        .await
        .context("Failed to shut down scheduler")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Result of `run-once`.
#[derive(Debug, Clone)]
pub struct RunOnceSummary {
    pub report: BatchReport,
    /// Users to display; present only when the completion flag is set.
    pub users: Option<Vec<User>>,
}

/// Run one batch, then list users if the batch left the flag set.
pub async fn run_batch(job: &EmailJob, directory: &dyn UserDirectory) -> RunOnceSummary {
    let report = job.run().await;

    let users = if job.completion().is_complete() {
        match directory.list_users().await {
            Ok(users) => Some(users),
            Err(e) => {
                warn!("Failed to list users for display: {}", e);
                None
            }
        }
    } else {
        None
    };

    RunOnceSummary { report, users }
}

/// Run a single batch in the foreground and print the outcome.
///
/// Per-user failures are reported but do not fail the command.
pub async fn run_once(config_path: Option<&str>, log_level_override: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, log_level_override, None)?;
    let _log_guard = init_logging(&settings.log_level, settings.log_dir.as_deref().map(Path::new))?;

    let (directory, mailer) = connect(&settings)?;
    let job = build_email_job(&settings, directory.clone(), mailer, CompletionFlag::new());

    let summary = run_batch(&job, directory.as_ref()).await;
    print!("{}", format_summary(&summary));

    Ok(())
}

/// Human readable report, followed by the user table when available.
pub fn format_summary(summary: &RunOnceSummary) -> String {
    let report = &summary.report;
    let mut out = String::new();

    if report.fetch_failed {
        out.push_str("Directory unavailable, no emails sent\n");
    } else {
        let _ = writeln!(
            out,
            "Fetched {} users, {} pending: {} sent, {} acknowledged, {} send failures, {} acknowledge failures",
            report.fetched,
            report.candidates,
            report.sent,
            report.acknowledged,
            report.send_failures,
            report.ack_failures,
        );
    }

    match &summary.users {
        Some(users) => {
            out.push_str("All emails sent.\n");
            let _ = writeln!(out, "{:<12} {:<40} EMAILED", "ID", "EMAIL");
            for user in users {
                let _ = writeln!(
                    out,
                    "{:<12} {:<40} {}",
                    user.id.as_str(),
                    user.email,
                    if user.notified { "yes" } else { "no" }
                );
            }
        }
        None => out.push_str("Emails not yet sent to all users.\n"),
    }

    out
}

/// Stop the running daemon by sending SIGTERM.
pub fn stop_daemon() -> Result<()> {
    let pid_file = PidFile::default_location();
    let pid = pid_file
        .read()
        .context("No PID file found - daemon may not be running")?;

    if !is_process_running(pid) {
        pid_file.remove();
        anyhow::bail!("Daemon not running (stale PID file removed)");
    }

    info!("Stopping daemon (PID {})", pid);

    #[cfg(unix)]
    {
        unsafe {
            if libc::kill(pid as i32, libc::SIGTERM) != 0 {
                anyhow::bail!("Failed to send SIGTERM to daemon");
            }
        }
        println!("Sent SIGTERM to daemon (PID {})", pid);
    }

    #[cfg(not(unix))]
    {
        anyhow::bail!("Stop command not yet implemented on this platform");
    }

    Ok(())
}

/// Show daemon status.
pub fn show_status() -> Result<()> {
    let pid_file = PidFile::default_location();
    println!("{}", describe_status(&pid_file));
    Ok(())
}

fn describe_status(pid_file: &PidFile) -> String {
    match pid_file.read() {
        Some(pid) if is_process_running(pid) => format!(
            "Notifier daemon is running (PID {})\nPID file: {:?}",
            pid,
            pid_file.path()
        ),
        Some(pid) => format!(
            "Notifier daemon is NOT running (stale PID {} in {:?})",
            pid,
            pid_file.path()
        ),
        None => "Notifier daemon is NOT running (no PID file)".to_string(),
    }
}
