//! Job registry for tracking job metadata and execution status.
//!
//! The `JobRegistry` is the read side of the scheduler: last and next run
//! times, durations, outcome counters and the paused flag that drives the
//! veto gate.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of a single tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    /// Job completed successfully
    Success,
    /// Job failed with an error message
    Failed(String),
    /// Tick dropped because a previous run was still active
    Skipped(String),
    /// Tick refused because the job is paused
    Vetoed,
}

/// Key/value output a job reports back to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub metadata: HashMap<String, String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add a numeric counter.
    pub fn with_count(self, key: impl Into<String>, count: usize) -> Self {
        self.with_metadata(key, count.to_string())
    }
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    /// Name of the job
    pub job_name: String,
    /// Human readable schedule, e.g. "every 180s"
    pub schedule: String,
    /// When the job last finished a run (if ever)
    pub last_run: Option<DateTime<Utc>>,
    /// Id of the most recent run that started
    pub last_run_id: Option<Uuid>,
    /// Duration of the last run in milliseconds
    pub last_duration_ms: Option<u64>,
    /// Result of the last tick
    pub last_result: Option<JobResult>,
    /// When the job is next scheduled to run
    pub next_run: Option<DateTime<Utc>>,
    /// Runs that actually executed
    pub run_count: u64,
    /// Runs that ended in failure
    pub error_count: u64,
    /// Ticks dropped by the overlap guard
    pub skip_count: u64,
    /// Ticks refused while paused
    pub veto_count: u64,
    /// Whether the job is currently executing
    pub is_running: bool,
    /// Whether the job is paused
    pub is_paused: bool,
    #[serde(default)]
    pub last_run_metadata: HashMap<String, String>,
}

impl JobStatus {
    pub fn new(job_name: String, schedule: String) -> Self {
        Self {
            job_name,
            schedule,
            last_run: None,
            last_run_id: None,
            last_duration_ms: None,
            last_result: None,
            next_run: None,
            run_count: 0,
            error_count: 0,
            skip_count: 0,
            veto_count: 0,
            is_running: false,
            is_paused: false,
            last_run_metadata: HashMap::new(),
        }
    }
}

/// Thread-safe registry of job status.
///
/// # Example
///
/// ```
/// use notifier_scheduler::{JobRegistry, JobResult};
/// use uuid::Uuid;
///
/// let registry = JobRegistry::new();
/// registry.register("email_notifications", "every 180s");
///
/// registry.record_start("email_notifications", Uuid::new_v4());
/// assert!(registry.is_running("email_notifications"));
///
/// registry.record_complete("email_notifications", JobResult::Success, 1500);
/// assert!(!registry.is_running("email_notifications"));
/// ```
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    // A panicking listener or job never holds this lock, but recover anyway
    // so status reads keep working.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, job_name: &str, f: impl FnOnce(&mut JobStatus)) -> bool {
        match self.write().get_mut(job_name) {
            Some(status) => {
                f(status);
                true
            }
            None => false,
        }
    }

    /// Register a job, replacing any previous entry with the same name.
    pub fn register(&self, job_name: &str, schedule: &str) {
        self.write().insert(
            job_name.to_string(),
            JobStatus::new(job_name.to_string(), schedule.to_string()),
        );
    }

    /// Record that a run has started executing.
    pub fn record_start(&self, job_name: &str, run_id: Uuid) {
        self.update(job_name, |status| {
            status.is_running = true;
            status.last_run_id = Some(run_id);
        });
    }

    pub fn record_complete(&self, job_name: &str, result: JobResult, duration_ms: u64) {
        self.record_complete_with_metadata(job_name, result, duration_ms, HashMap::new());
    }

    /// Record that a run has finished, with whatever the job reported.
    pub fn record_complete_with_metadata(
        &self,
        job_name: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: HashMap<String, String>,
    ) {
        self.update(job_name, |status| {
            status.is_running = false;
            status.last_run = Some(Utc::now());
            status.last_duration_ms = Some(duration_ms);
            status.run_count += 1;
            if matches!(result, JobResult::Failed(_)) {
                status.error_count += 1;
            }
            status.last_result = Some(result);
            status.last_run_metadata = metadata;
        });
    }

    /// Record a tick dropped by the overlap guard.
    ///
    /// `is_running` is left alone: the run holding the slot is still active.
    pub fn record_skipped(&self, job_name: &str, reason: &str) {
        self.update(job_name, |status| {
            status.skip_count += 1;
            status.last_result = Some(JobResult::Skipped(reason.to_string()));
        });
    }

    /// Record a tick refused by the veto gate.
    pub fn record_vetoed(&self, job_name: &str) {
        self.update(job_name, |status| {
            status.veto_count += 1;
            status.last_result = Some(JobResult::Vetoed);
        });
    }

    pub fn set_next_run(&self, job_name: &str, next: DateTime<Utc>) {
        self.update(job_name, |status| status.next_run = Some(next));
    }

    /// Set the paused state of a job.
    ///
    /// Returns `false` if the job is not registered.
    pub fn set_paused(&self, job_name: &str, paused: bool) -> bool {
        self.update(job_name, |status| status.is_paused = paused)
    }

    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.read().get(job_name).cloned()
    }

    /// Status of every registered job, ordered by name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        all
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.read()
            .get(job_name)
            .map(|s| s.is_running)
            .unwrap_or(false)
    }

    pub fn is_registered(&self, job_name: &str) -> bool {
        self.read().contains_key(job_name)
    }

    pub fn is_paused(&self, job_name: &str) -> bool {
        self.read()
            .get(job_name)
            .map(|s| s.is_paused)
            .unwrap_or(false)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
