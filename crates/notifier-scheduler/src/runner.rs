//! Execution wrapper around a single job.
//!
//! Every tick of a job goes through [`JobRunner::fire`], which applies the
//! shutdown check, the veto gate and the overlap guard before running the
//! job body on its own task. Panics and errors from the body are turned
//! into a [`JobExecutionError`] here and never reach the scheduler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::listener::{ListenerSet, RunContext, RunOutcome};
use crate::overlap::OverlapGuard;
use crate::registry::{JobOutput, JobRegistry, JobResult};
use crate::JobExecutionError;

/// Boxed future produced by a job body.
pub type JobFuture = Pin<Box<dyn Future<Output = Result<JobOutput, JobExecutionError>> + Send>>;

/// Factory invoked once per run.
pub type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// A run that actually executed.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub context: RunContext,
    pub outcome: RunOutcome,
    pub duration_ms: u64,
    pub metadata: HashMap<String, String>,
}

/// What happened to one tick.
#[derive(Debug, Clone)]
pub enum FireOutcome {
    /// The job body ran to completion or failure.
    Completed(ExecutionRecord),
    /// A previous run still held the overlap slot.
    Skipped,
    /// The job is paused.
    Vetoed(RunContext),
    /// Shutdown had already been requested.
    ShuttingDown,
}

impl FireOutcome {
    pub fn record(&self) -> Option<&ExecutionRecord> {
        match self {
            FireOutcome::Completed(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FireOutcome::Skipped)
    }

    pub fn is_vetoed(&self) -> bool {
        matches!(self, FireOutcome::Vetoed(_))
    }
}

pub(crate) struct JobRunner {
    name: String,
    job_fn: JobFn,
    guard: OverlapGuard,
    registry: Arc<JobRegistry>,
    listeners: ListenerSet,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub(crate) fn new(
        name: String,
        job_fn: JobFn,
        guard: OverlapGuard,
        registry: Arc<JobRegistry>,
        listeners: ListenerSet,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name,
            job_fn,
            guard,
            registry,
            listeners,
            shutdown,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn fire(&self) -> FireOutcome {
        if self.shutdown.is_cancelled() {
            debug!(job = %self.name, "Shutdown requested, not starting run");
            return FireOutcome::ShuttingDown;
        }

        let ctx = RunContext::new(&self.name);

        if self.registry.is_paused(&self.name) {
            self.listeners.notify_vetoed(&ctx);
            self.registry.record_vetoed(&self.name);
            return FireOutcome::Vetoed(ctx);
        }

        let Some(permit) = self.guard.try_acquire() else {
            warn!(
                job = %self.name,
                skipped_total = self.guard.skipped(),
                "Previous run still in progress, skipping this tick"
            );
            self.registry.record_skipped(&self.name, "overlap");
            return FireOutcome::Skipped;
        };

        self.listeners.notify_before(&ctx);
        self.registry.record_start(&self.name, ctx.run_id);

        let start = Instant::now();
        let job_fn = self.job_fn.clone();
        // The permit lives with the job body, so dropping this future mid-run
        // does not free the slot while the body is still executing.
        let body = tokio::spawn(async move {
            let _permit = permit;
            job_fn().await
        });
        let result = match body.await {
            Ok(result) => result,
            Err(join_err) => Err(JobExecutionError::from_join_error(join_err)),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let (outcome, job_result, metadata) = match result {
            Ok(output) => (RunOutcome::Succeeded, JobResult::Success, output.metadata),
            Err(err) => {
                error!(
                    job = %self.name,
                    run_id = %ctx.run_id,
                    error = %err,
                    refire_immediately = err.refire_immediately,
                    "Job run failed"
                );
                let message = err.message.clone();
                (RunOutcome::Failed(err), JobResult::Failed(message), HashMap::new())
            }
        };

        self.registry
            .record_complete_with_metadata(&self.name, job_result, duration_ms, metadata.clone());
        self.listeners.notify_after(&ctx, &outcome);

        FireOutcome::Completed(ExecutionRecord {
            context: ctx,
            outcome,
            duration_ms,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::RecordingListener;
    use crate::overlap::OverlapPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn runner_with(job_fn: JobFn, registry: Arc<JobRegistry>, listeners: ListenerSet) -> JobRunner {
        registry.register("test-job", "every 1s");
        JobRunner::new(
            "test-job".to_string(),
            job_fn,
            OverlapGuard::new(OverlapPolicy::Skip),
            registry,
            listeners,
            CancellationToken::new(),
        )
    }

    fn ok_job() -> JobFn {
        Arc::new(|| -> JobFuture { Box::pin(async { Ok(JobOutput::new().with_count("sent", 2)) }) })
    }

    #[tokio::test]
    async fn test_fire_success_records_everything() {
        let registry = Arc::new(JobRegistry::new());
        let listeners = ListenerSet::new();
        let recorder = Arc::new(RecordingListener::new());
        listeners.add(recorder.clone());
        let runner = runner_with(ok_job(), registry.clone(), listeners);

        let outcome = runner.fire().await;

        let record = outcome.record().expect("run should complete");
        assert!(record.outcome.is_success());
        assert_eq!(record.metadata.get("sent"), Some(&"2".to_string()));

        let status = registry.get_status("test-job").unwrap();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.last_result, Some(JobResult::Success));
        assert_eq!(status.last_run_id, Some(record.context.run_id));
        assert_eq!(
            recorder.events(),
            vec!["before:test-job", "after:test-job:ok"]
        );
    }

    #[tokio::test]
    async fn test_fire_error_becomes_failed_outcome() {
        let registry = Arc::new(JobRegistry::new());
        let job: JobFn = Arc::new(|| -> JobFuture {
            Box::pin(async { Err(JobExecutionError::unhandled("directory unreachable")) })
        });
        let runner = runner_with(job, registry.clone(), ListenerSet::new());

        let outcome = runner.fire().await;

        match &outcome.record().unwrap().outcome {
            RunOutcome::Failed(err) => {
                assert_eq!(err.message, "directory unreachable");
                assert!(!err.refire_immediately);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(registry.get_status("test-job").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_fire_panic_is_contained() {
        let registry = Arc::new(JobRegistry::new());
        let explode = true;
        let job: JobFn = Arc::new(move || -> JobFuture {
            Box::pin(async move {
                if explode {
                    panic!("job body panicked");
                }
                Ok(JobOutput::new())
            })
        });
        let runner = runner_with(job, registry.clone(), ListenerSet::new());

        let outcome = runner.fire().await;

        match &outcome.record().unwrap().outcome {
            RunOutcome::Failed(err) => assert!(err.message.contains("job body panicked")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!registry.is_running("test-job"));

        // The slot was released, so the next tick runs.
        assert!(runner.fire().await.record().is_some());
    }

    #[tokio::test]
    async fn test_paused_job_is_vetoed() {
        let registry = Arc::new(JobRegistry::new());
        let listeners = ListenerSet::new();
        let recorder = Arc::new(RecordingListener::new());
        listeners.add(recorder.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let job: JobFn = Arc::new(move || -> JobFuture {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(JobOutput::new()) })
        });
        let runner = runner_with(job, registry.clone(), listeners);
        registry.set_paused("test-job", true);

        let outcome = runner.fire().await;

        assert!(outcome.is_vetoed());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.events(), vec!["vetoed:test-job"]);
        assert_eq!(registry.get_status("test-job").unwrap().veto_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_tick_is_skipped() {
        let registry = Arc::new(JobRegistry::new());
        let job: JobFn = Arc::new(|| -> JobFuture {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(JobOutput::new())
            })
        });
        let runner = Arc::new(runner_with(job, registry.clone(), ListenerSet::new()));

        let first = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.fire().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = runner.fire().await;

        assert!(second.is_skipped());
        assert!(first.await.unwrap().record().is_some());

        let status = registry.get_status("test-job").unwrap();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.skip_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fire_keeps_slot_until_body_finishes() {
        let registry = Arc::new(JobRegistry::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (active_in, peak_in) = (active.clone(), peak.clone());
        let job: JobFn = Arc::new(move || -> JobFuture {
            let active = active_in.clone();
            let peak = peak_in.clone();
            Box::pin(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(JobOutput::new())
            })
        });
        let runner = runner_with(job, registry.clone(), ListenerSet::new());

        let abandoned = tokio::time::timeout(Duration::from_millis(50), runner.fire()).await;
        assert!(abandoned.is_err());

        // The first body is still running, so this tick must be refused.
        assert!(runner.fire().await.is_skipped());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        // Once the body finished, the slot is free again.
        assert!(runner.fire().await.record().is_some());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_new_runs() {
        let registry = Arc::new(JobRegistry::new());
        registry.register("test-job", "every 1s");
        let token = CancellationToken::new();
        let runner = JobRunner::new(
            "test-job".to_string(),
            ok_job(),
            OverlapGuard::new(OverlapPolicy::Skip),
            registry.clone(),
            ListenerSet::new(),
            token.clone(),
        );

        token.cancel();

        assert!(matches!(runner.fire().await, FireOutcome::ShuttingDown));
        assert_eq!(registry.get_status("test-job").unwrap().run_count, 0);
        assert_eq!(runner.name(), "test-job");
    }
}
