//! Scheduler service wrapper around tokio-cron-scheduler.
//!
//! tokio-cron-scheduler only produces ticks. Everything a tick does goes
//! through a [`JobRunner`], and every run is tracked so shutdown can wait for
//! in-flight work.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::listener::{ExecutionListener, ListenerSet};
use crate::overlap::{OverlapGuard, OverlapPolicy};
use crate::registry::{JobOutput, JobRegistry};
use crate::runner::{FireOutcome, JobFn, JobFuture, JobRunner};
use crate::schedule::{parse_timezone, JobSchedule};
use crate::{JobExecutionError, SchedulerConfig, SchedulerError};

struct RegisteredJob {
    runner: Arc<JobRunner>,
    uuid: Uuid,
    fires_on_start: bool,
}

/// Service wrapper around JobScheduler for lifecycle management.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    listeners: ListenerSet,
    jobs: RwLock<HashMap<String, RegisteredJob>>,
    tracker: TaskTracker,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create a new scheduler service with the given configuration.
    ///
    /// The scheduler is created but not started. Call `start()` to begin
    /// executing scheduled jobs.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        // Validate timezone configuration upfront
        let _ = config.parse_timezone()?;

        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            registry: Arc::new(JobRegistry::new()),
            listeners: ListenerSet::new(),
            jobs: RwLock::new(HashMap::new()),
            tracker: TaskTracker::new(),
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    /// Start ticking. Jobs whose schedule fires on start run right away.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if already started.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.scheduler.start().await?;

        for runner in self.startup_runners() {
            self.spawn_fire(runner);
        }

        info!(jobs = self.registry.job_count(), "Scheduler started");
        Ok(())
    }

    /// Stop ticking and wait for in-flight runs.
    ///
    /// The shutdown token is cancelled first, so no new run starts. Runs
    /// already executing get up to `shutdown_timeout_secs` to finish; after
    /// that shutdown returns anyway and the stragglers are abandoned.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotRunning` if not started.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Error during scheduler shutdown: {}", e);
        }

        self.tracker.close();
        let timeout = self.config.shutdown_timeout();
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => debug!("All in-flight runs finished"),
            Err(_) => warn!(
                in_flight = self.tracker.len(),
                timeout_secs = timeout.as_secs(),
                "Shutdown timeout elapsed with runs still in flight"
            ),
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");

        Ok(())
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    /// Add a listener for every job, including ones already registered.
    pub fn add_listener(&self, listener: Arc<dyn ExecutionListener>) {
        debug!(listener = listener.name(), "Execution listener added");
        self.listeners.add(listener);
    }

    /// Register a recurring job.
    ///
    /// Every tick runs `job_fn` through the execution wrapper: shutdown
    /// check, veto gate, overlap guard, listeners and registry updates.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::DuplicateJob` if the name is taken, or an
    /// invalid cron, timezone or interval error from the schedule.
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        schedule: JobSchedule,
        policy: OverlapPolicy,
        job_fn: F,
    ) -> Result<Uuid, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, JobExecutionError>> + Send + 'static,
    {
        schedule.validate()?;
        if self.read_jobs().contains_key(name) {
            return Err(SchedulerError::DuplicateJob(name.to_string()));
        }

        let job_fn: JobFn = Arc::new(move || -> JobFuture { Box::pin(job_fn()) });
        let runner = Arc::new(JobRunner::new(
            name.to_string(),
            job_fn,
            OverlapGuard::new(policy),
            self.registry.clone(),
            self.listeners.clone(),
            self.shutdown_token.clone(),
        ));

        let job = self.build_tick_job(&schedule, runner.clone())?;
        self.registry.register(name, &schedule.to_string());
        let uuid = self.scheduler.add(job).await?;

        let mut scheduler = self.scheduler.clone();
        if let Ok(Some(next)) = scheduler.next_tick_for_job(uuid).await {
            self.registry.set_next_run(name, next);
        }

        let fires_on_start = schedule.fires_on_start();
        self.write_jobs().insert(
            name.to_string(),
            RegisteredJob {
                runner: runner.clone(),
                uuid,
                fires_on_start,
            },
        );

        info!(job = %name, uuid = %uuid, schedule = %schedule, ?policy, "Job registered");

        if fires_on_start && self.is_running() {
            self.spawn_fire(runner);
        }

        Ok(uuid)
    }

    /// Pause a job. Ticks that arrive while paused are vetoed.
    pub fn pause_job(&self, name: &str) -> Result<(), SchedulerError> {
        if !self.registry.set_paused(name, true) {
            return Err(SchedulerError::JobNotFound(name.to_string()));
        }
        info!(job = %name, "Job paused");
        Ok(())
    }

    pub fn resume_job(&self, name: &str) -> Result<(), SchedulerError> {
        if !self.registry.set_paused(name, false) {
            return Err(SchedulerError::JobNotFound(name.to_string()));
        }
        info!(job = %name, "Job resumed");
        Ok(())
    }

    /// Fire a job now, outside its schedule, and wait for the tick to end.
    ///
    /// The tick goes through the same wrapper as a scheduled one, so it can
    /// be vetoed or skipped.
    pub async fn trigger_job(&self, name: &str) -> Result<FireOutcome, SchedulerError> {
        let runner = self
            .read_jobs()
            .get(name)
            .map(|job| job.runner.clone())
            .ok_or_else(|| SchedulerError::JobNotFound(name.to_string()))?;

        debug!(job = %name, "Manual trigger");
        Ok(self
            .tracker
            .track_future(async move { runner.fire().await })
            .await)
    }

    /// Scheduler-assigned id of a registered job.
    pub fn job_id(&self, name: &str) -> Option<Uuid> {
        self.read_jobs().get(name).map(|job| job.uuid)
    }

    fn build_tick_job(
        &self,
        schedule: &JobSchedule,
        runner: Arc<JobRunner>,
    ) -> Result<Job, SchedulerError> {
        let tracker = self.tracker.clone();
        let registry = self.registry.clone();

        let on_tick = move |uuid: Uuid,
                            mut scheduler: JobScheduler|
              -> Pin<Box<dyn Future<Output = ()> + Send>> {
            let runner = runner.clone();
            let tracker = tracker.clone();
            let registry = registry.clone();

            Box::pin(async move {
                if let Ok(Some(next)) = scheduler.next_tick_for_job(uuid).await {
                    registry.set_next_run(runner.name(), next);
                }
                tracker.track_future(async move { runner.fire().await }).await;
            })
        };

        match schedule {
            JobSchedule::Interval { every, .. } => Job::new_repeated_async(*every, on_tick)
                .map_err(|e| SchedulerError::InvalidInterval(e.to_string())),
            JobSchedule::Cron { expr, timezone } => {
                let tz = match timezone {
                    Some(tz) => parse_timezone(tz)?,
                    None => self.config.parse_timezone()?,
                };
                Job::new_async_tz(expr.as_str(), tz, on_tick)
                    .map_err(|e| SchedulerError::InvalidCron(format!("'{expr}': {e}")))
            }
        }
    }

    fn spawn_fire(&self, runner: Arc<JobRunner>) {
        self.tracker.spawn(async move {
            runner.fire().await;
        });
    }

    fn startup_runners(&self) -> Vec<Arc<JobRunner>> {
        self.read_jobs()
            .values()
            .filter(|job| job.fires_on_start)
            .map(|job| job.runner.clone())
            .collect()
    }

    fn read_jobs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, RegisteredJob>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_jobs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, RegisteredJob>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }
}
