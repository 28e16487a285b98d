//! Execution listeners.
//!
//! Listeners observe every tick of a job: `before_execute` and
//! `after_execute` bracket a run, `execution_vetoed` replaces both when the
//! job is paused. A listener that panics is logged and skipped; it never
//! affects the run or the other listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::panic_message;
use crate::JobExecutionError;

/// Identity of one tick.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub job_name: String,
    pub run_id: Uuid,
    pub fired_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            run_id: Uuid::new_v4(),
            fired_at: Utc::now(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed(JobExecutionError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

/// Observer of job execution.
///
/// All callbacks default to no-ops.
pub trait ExecutionListener: Send + Sync {
    fn name(&self) -> &str;

    fn before_execute(&self, _ctx: &RunContext) {}

    fn execution_vetoed(&self, _ctx: &RunContext) {}

    fn after_execute(&self, _ctx: &RunContext, _outcome: &RunOutcome) {}
}

/// Logs each lifecycle event.
#[derive(Debug, Default)]
pub struct TracingListener;

impl ExecutionListener for TracingListener {
    fn name(&self) -> &str {
        "tracing"
    }

    fn before_execute(&self, ctx: &RunContext) {
        info!(job = %ctx.job_name, run_id = %ctx.run_id, "Job is about to be executed");
    }

    fn execution_vetoed(&self, ctx: &RunContext) {
        info!(job = %ctx.job_name, run_id = %ctx.run_id, "Job execution was vetoed");
    }

    fn after_execute(&self, ctx: &RunContext, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Succeeded => {
                info!(job = %ctx.job_name, run_id = %ctx.run_id, "Job was executed");
            }
            RunOutcome::Failed(err) => {
                error!(
                    job = %ctx.job_name,
                    run_id = %ctx.run_id,
                    error = %err,
                    "Job was executed with an error"
                );
            }
        }
    }
}

/// Shared, append-only list of listeners.
#[derive(Clone, Default)]
pub struct ListenerSet {
    listeners: Arc<RwLock<Vec<Arc<dyn ExecutionListener>>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn ExecutionListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_before(&self, ctx: &RunContext) {
        self.each("before_execute", |l| l.before_execute(ctx));
    }

    pub fn notify_vetoed(&self, ctx: &RunContext) {
        self.each("execution_vetoed", |l| l.execution_vetoed(ctx));
    }

    pub fn notify_after(&self, ctx: &RunContext, outcome: &RunOutcome) {
        self.each("after_execute", |l| l.after_execute(ctx, outcome));
    }

    fn snapshot(&self) -> Vec<Arc<dyn ExecutionListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn each(&self, event: &str, f: impl Fn(&dyn ExecutionListener)) {
        for listener in self.snapshot() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))) {
                error!(
                    listener = listener.name(),
                    event,
                    panic = %panic_message(payload.as_ref()),
                    "Execution listener panicked"
                );
            }
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        f.debug_struct("ListenerSet").field("listeners", &names).finish()
    }
}

/// Records every callback it receives. Useful in tests.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: std::sync::Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events in arrival order, formatted as `"<event>:<job>"`.
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn push(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl ExecutionListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn before_execute(&self, ctx: &RunContext) {
        self.push(format!("before:{}", ctx.job_name));
    }

    fn execution_vetoed(&self, ctx: &RunContext) {
        self.push(format!("vetoed:{}", ctx.job_name));
    }

    fn after_execute(&self, ctx: &RunContext, outcome: &RunOutcome) {
        let tag = if outcome.is_success() { "ok" } else { "failed" };
        self.push(format!("after:{}:{tag}", ctx.job_name));
    }
}
