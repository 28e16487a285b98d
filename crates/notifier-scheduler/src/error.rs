//! Error types for the scheduler crate.
//!
//! [`SchedulerError`] covers scheduler lifecycle and job registration.
//! [`JobExecutionError`] is the terminal failure of a single run; it never
//! escapes the execution wrapper.

use std::any::Any;

use thiserror::Error;
use tokio::task::JoinError;
use tokio_cron_scheduler::JobSchedulerError;

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Error from the underlying tokio-cron-scheduler
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid timezone string
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Interval schedules need at least one second between runs
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// Job not found in scheduler
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// A job with this name is already registered
    #[error("Job already registered: {0}")]
    DuplicateJob(String),

    /// Scheduler is already running
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler is not running")]
    NotRunning,
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Scheduler(err.to_string())
    }
}

/// Terminal failure of one run.
///
/// Runs that fail this way are not refired; the next scheduled tick is
/// the retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct JobExecutionError {
    pub message: String,
    pub refire_immediately: bool,
}

impl JobExecutionError {
    /// An error the job body did not handle itself.
    pub fn unhandled(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            refire_immediately: false,
        }
    }

    pub(crate) fn from_join_error(err: JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            Self::unhandled(format!("job panicked: {}", panic_message(payload.as_ref())))
        } else {
            Self::unhandled("job task was cancelled")
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
