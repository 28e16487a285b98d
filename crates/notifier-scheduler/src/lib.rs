//! Recurring job engine for the user notifier.
//!
//! This crate drives the email batch job on a fixed interval using
//! `tokio-cron-scheduler`, with an execution wrapper around every tick.
//!
//! # Features
//!
//! - Interval schedules that fire on start, plus six-field cron schedules
//!   with timezone support via chrono-tz
//! - Misfire-skip: a tick that overlaps a running execution is dropped
//! - Pause/resume through a veto gate
//! - Execution listeners with panic isolation
//! - Job status observability via [`JobRegistry`]
//! - Graceful shutdown that waits, bounded, for in-flight runs
//!
//! # Example
//!
//! ```ignore
//! use notifier_scheduler::{
//!     jobs::email::{register_email_job, EmailJob},
//!     JobSchedule, SchedulerConfig, SchedulerService, TracingListener,
//! };
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! scheduler.add_listener(Arc::new(TracingListener));
//!
//! let job = EmailJob::new(directory, mailer, completion.clone());
//! register_email_job(&scheduler, job, JobSchedule::every(Duration::from_secs(180))).await?;
//!
//! scheduler.start().await?;
//! ```

mod config;
mod error;
mod listener;
mod overlap;
mod registry;
mod runner;
mod schedule;
mod scheduler;

pub mod jobs;

pub use config::SchedulerConfig;
pub use error::{JobExecutionError, SchedulerError};
pub use listener::{
    ExecutionListener, ListenerSet, RecordingListener, RunContext, RunOutcome, TracingListener,
};
pub use overlap::{OverlapGuard, OverlapPolicy, RunPermit};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use runner::{ExecutionRecord, FireOutcome, JobFn, JobFuture};
pub use schedule::{parse_timezone, validate_cron_expression, JobSchedule};
pub use scheduler::SchedulerService;
