//! Background job supervisor.
//!
//! Owns the job state machine `(none) -> Running -> {Completed, Failed}`,
//! enforces single-flight per job type through [`JobStore::create_running`],
//! and runs each unit on a detached task under a panic guard.
//!
//! Cancellation: [`JobSupervisor::stop`] writes the terminal status and then
//! cancels the job's [`CancellationToken`]. Snippet units are preempted at the
//! next interpreter tick. Native units only stop if they poll
//! [`JobContext::cancel`]; until then their work keeps running even though
//! the job already reads as Failed.
//!
//! The final-status sequence (re-read, log entry, terminal write) of `stop`
//! and of a finishing unit runs under one per-job lock, so the progress log
//! never disagrees with the terminal status.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{CoreError, CoreResult};
use crate::job::{
    CreateOutcome, Job, JobStatus, LogLevel, NewLogEntry, ProgressLogEntry, StartOutcome,
    StatusUpdate,
};
use crate::store::{JobStore, ProgressLogStore};
use crate::types::DbId;

/// Error message written when a job is stopped.
pub const STOPPED_BY_USER: &str = "stopped by user";

/// Serializes the final-status sequence of one job.
type JobLock = Arc<tokio::sync::Mutex<()>>;

/// Error message written for jobs left Running by a previous process.
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by server restart";

/// A unit of background work. `Ok` carries the optional result summary,
/// `Err` the failure reason.
pub type JobUnit =
    Box<dyn FnOnce(JobContext) -> BoxFuture<'static, Result<Option<Value>, String>> + Send>;

/// Box an async closure as a [`JobUnit`].
pub fn job_unit<F, Fut>(f: F) -> JobUnit
where
    F: FnOnce(JobContext) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<Option<Value>, String>> + Send + 'static,
{
    Box::new(move |ctx| f(ctx).boxed())
}

// ---------------------------------------------------------------------------
// Job context
// ---------------------------------------------------------------------------

/// Writes progress entries for one job.
#[derive(Clone)]
pub struct JobLogger {
    job_id: DbId,
    logs: Arc<dyn ProgressLogStore>,
}

impl JobLogger {
    pub fn new(job_id: DbId, logs: Arc<dyn ProgressLogStore>) -> Self {
        Self { job_id, logs }
    }

    pub fn job_id(&self) -> DbId {
        self.job_id
    }

    pub async fn write(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        step_number: Option<i32>,
    ) -> CoreResult<ProgressLogEntry> {
        self.logs
            .append(NewLogEntry {
                job_id: self.job_id,
                level,
                message: message.into(),
                step_number,
            })
            .await
    }

    pub async fn info(&self, message: impl Into<String>) -> CoreResult<()> {
        self.write(LogLevel::Info, message, None).await.map(|_| ())
    }

    pub async fn warning(&self, message: impl Into<String>) -> CoreResult<()> {
        self.write(LogLevel::Warning, message, None).await.map(|_| ())
    }

    pub async fn error(&self, message: impl Into<String>) -> CoreResult<()> {
        self.write(LogLevel::Error, message, None).await.map(|_| ())
    }

    pub async fn success(&self, message: impl Into<String>) -> CoreResult<()> {
        self.write(LogLevel::Success, message, None).await.map(|_| ())
    }

    pub async fn step(&self, step_number: i32, message: impl Into<String>) -> CoreResult<()> {
        self.write(LogLevel::Info, message, Some(step_number))
            .await
            .map(|_| ())
    }
}

/// Handed to a unit when it starts.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: DbId,
    pub job_type: String,
    /// Cancelled by `stop` and on shutdown.
    pub cancel: CancellationToken,
    pub log: JobLogger,
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct JobSupervisor {
    jobs: Arc<dyn JobStore>,
    logs: Arc<dyn ProgressLogStore>,
    tokens: Arc<Mutex<HashMap<DbId, CancellationToken>>>,
    locks: Arc<Mutex<HashMap<DbId, JobLock>>>,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl JobSupervisor {
    pub fn new(jobs: Arc<dyn JobStore>, logs: Arc<dyn ProgressLogStore>) -> Self {
        Self {
            jobs,
            logs,
            tokens: Arc::new(Mutex::new(HashMap::new())),
            locks: Arc::new(Mutex::new(HashMap::new())),
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<DbId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn job_lock(&self, job_id: DbId) -> JobLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(job_id).or_default())
    }

    /// Drop the lock entry of a terminal job. Holders keep their clone.
    fn release_lock(&self, job_id: DbId) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
    }

    /// Create a Running job of `job_type` and run `unit` detached, unless
    /// one is already running.
    pub async fn start(&self, job_type: &str, unit: JobUnit) -> StartOutcome {
        let job_type = job_type.trim();
        if job_type.is_empty() {
            return StartOutcome::Error {
                message: "job_type is required".into(),
            };
        }
        if self.root.is_cancelled() {
            return StartOutcome::Error {
                message: "server is shutting down".into(),
            };
        }

        let job = match self.jobs.create_running(job_type).await {
            Ok(CreateOutcome::Created(job)) => job,
            Ok(CreateOutcome::AlreadyRunning(job)) => {
                tracing::info!(job_id = job.id, job_type, "Job already running");
                return StartOutcome::AlreadyRunning { job_id: job.id };
            }
            Err(e) => {
                tracing::error!(job_type, error = %e, "Failed to create job");
                return StartOutcome::Error {
                    message: e.to_string(),
                };
            }
        };

        let cancel = self.root.child_token();
        self.tokens().insert(job.id, cancel.clone());
        // A stop that landed before the token was registered found nothing
        // to cancel; its terminal status is visible now.
        match self.jobs.find(job.id).await {
            Ok(Some(current)) if current.status.is_terminal() => {
                tracing::info!(job_id = job.id, status = %current.status, "Job finished before its unit started");
                self.tokens().remove(&job.id);
                cancel.cancel();
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(job_id = job.id, error = %e, "Failed to re-read new job"),
        }
        let ctx = JobContext {
            job_id: job.id,
            job_type: job.job_type.clone(),
            cancel,
            log: JobLogger::new(job.id, Arc::clone(&self.logs)),
        };

        let this = self.clone();
        let job_id = job.id;
        self.tracker.spawn(async move {
            let outcome = AssertUnwindSafe(async move { unit(ctx).await })
                .catch_unwind()
                .await;
            this.complete(job_id, outcome).await;
        });

        tracing::info!(job_id, job_type, "Job started");
        StartOutcome::Started { job_id }
    }

    /// Record the unit's outcome. A job stopped while the unit ran keeps the
    /// status `stop` gave it.
    async fn complete(
        &self,
        job_id: DbId,
        outcome: Result<Result<Option<Value>, String>, Box<dyn Any + Send>>,
    ) {
        self.tokens().remove(&job_id);

        let (status, error_message, summary) = match outcome {
            Ok(Ok(summary)) => (JobStatus::Completed, None, summary),
            Ok(Err(message)) => (JobStatus::Failed, Some(message), None),
            Err(panic) => (
                JobStatus::Failed,
                Some(format!("job unit panicked: {}", panic_message(panic.as_ref()))),
                None,
            ),
        };

        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;
        self.write_outcome(job_id, status, error_message, summary).await;
        self.release_lock(job_id);
    }

    async fn write_outcome(
        &self,
        job_id: DbId,
        status: JobStatus,
        error_message: Option<String>,
        summary: Option<Value>,
    ) {
        match self.jobs.find(job_id).await {
            Ok(Some(job)) if job.status.is_terminal() => {
                tracing::debug!(job_id, status = %job.status, "Job finished after reaching a terminal status");
                return;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(job_id, error = %e, "Failed to re-read job before completion"),
        }

        let logger = JobLogger::new(job_id, Arc::clone(&self.logs));
        let logged = match &error_message {
            None => logger.success("Job completed").await,
            Some(message) => logger.error(format!("Job failed: {message}")).await,
        };
        if let Err(e) = logged {
            tracing::warn!(job_id, error = %e, "Failed to write final job log entry");
        }

        match self
            .jobs
            .finish(job_id, status, error_message.as_deref(), summary.as_ref())
            .await
        {
            Ok(Some(StatusUpdate::Applied(job))) => {
                tracing::info!(job_id, job_type = %job.job_type, status = %job.status, "Job finished");
            }
            Ok(Some(StatusUpdate::AlreadyTerminal(job))) => {
                tracing::debug!(job_id, status = %job.status, "Job already terminal");
            }
            Ok(None) => tracing::warn!(job_id, "Job vanished before completion"),
            Err(e) => tracing::error!(job_id, error = %e, "Failed to write job status"),
        }
    }

    /// Write a terminal status. Terminal fields are written once; a second
    /// call reports [`StatusUpdate::AlreadyTerminal`] without changing anything.
    pub async fn update_status(
        &self,
        job_id: DbId,
        status: JobStatus,
        error_message: Option<&str>,
        result_summary: Option<&Value>,
    ) -> CoreResult<StatusUpdate> {
        if !status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "status must be completed or failed, got {status}"
            )));
        }
        let update = self
            .jobs
            .finish(job_id, status, error_message, result_summary)
            .await?
            .ok_or_else(|| CoreError::not_found("job", job_id))?;
        if let StatusUpdate::Applied(_) = update {
            if let Some(token) = self.tokens().remove(&job_id) {
                token.cancel();
            }
        }
        Ok(update)
    }

    /// Stop a job. A job that is not Running is returned unchanged.
    pub async fn stop(&self, job_id: DbId) -> CoreResult<Job> {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;
        let stopped = self.stop_locked(job_id).await;
        self.release_lock(job_id);
        stopped
    }

    async fn stop_locked(&self, job_id: DbId) -> CoreResult<Job> {
        let job = self
            .jobs
            .find(job_id)
            .await?
            .ok_or_else(|| CoreError::not_found("job", job_id))?;
        if job.status != JobStatus::Running {
            return Ok(job);
        }

        // The warning goes first so tailers read it before the terminal status.
        let logger = JobLogger::new(job_id, Arc::clone(&self.logs));
        if let Err(e) = logger.warning("Stop requested by user").await {
            tracing::warn!(job_id, error = %e, "Failed to write stop log entry");
        }

        let update = self
            .jobs
            .finish(job_id, JobStatus::Failed, Some(STOPPED_BY_USER), None)
            .await?
            .ok_or_else(|| CoreError::not_found("job", job_id))?;
        if let Some(token) = self.tokens().remove(&job_id) {
            token.cancel();
        }

        tracing::info!(job_id, job_type = %job.job_type, "Job stopped");
        Ok(update.into_job())
    }

    pub async fn is_running(&self, job_type: &str) -> CoreResult<bool> {
        Ok(self.jobs.find_running(job_type).await?.is_some())
    }

    /// Fail every job a previous process left Running.
    pub async fn recover_orphans(&self) -> CoreResult<u64> {
        let recovered = self.jobs.fail_all_running(INTERRUPTED_BY_RESTART).await?;
        if recovered > 0 {
            tracing::warn!(recovered, "Failed jobs orphaned by a previous run");
        }
        Ok(recovered)
    }

    /// Cancel every running unit and wait up to `budget` for them to finish.
    /// Returns `true` when all units drained in time.
    pub async fn shutdown(&self, budget: Duration) -> bool {
        self.root.cancel();
        self.tracker.close();
        let drained = tokio::time::timeout(budget, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            tracing::warn!(remaining = self.tracker.len(), "Job units still running at shutdown");
        }
        drained
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::memory::MemoryStore;

    fn supervisor() -> (JobSupervisor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (JobSupervisor::new(store.clone(), store.clone()), store)
    }

    async fn wait_terminal(store: &MemoryStore, job_id: DbId) -> Job {
        for _ in 0..400 {
            let job = JobStore::find(store, job_id).await.unwrap().unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never reached a terminal status");
    }

    async fn explode() -> Result<Option<Value>, String> {
        panic!("exploded")
    }

    fn blocked_unit(release: Arc<Notify>) -> JobUnit {
        job_unit(move |_ctx| async move {
            release.notified().await;
            Ok(None)
        })
    }

    // ---- Test: single flight ----

    #[tokio::test]
    async fn second_start_reports_already_running() {
        let (sup, store) = supervisor();
        let release = Arc::new(Notify::new());

        let first = sup.start("sync", blocked_unit(release.clone())).await;
        let second = sup.start("sync", blocked_unit(release.clone())).await;

        let job_id = assert_matches!(first, StartOutcome::Started { job_id } => job_id);
        assert_eq!(second, StartOutcome::AlreadyRunning { job_id });
        assert_eq!(JobStore::list(&*store, 100).await.unwrap().len(), 1);

        release.notify_one();
        assert_eq!(wait_terminal(&store, job_id).await.status, JobStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_create_exactly_one_job() {
        let (sup, store) = supervisor();
        let release = Arc::new(Notify::new());

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let sup = sup.clone();
                let release = release.clone();
                tokio::spawn(async move { sup.start("sync", blocked_unit(release)).await })
            })
            .collect();
        let mut started = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), StartOutcome::Started { .. }) {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(JobStore::list(&*store, 100).await.unwrap().len(), 1);
        release.notify_one();
    }

    // ---- Test: unit outcomes ----

    #[tokio::test]
    async fn successful_unit_completes_with_summary() {
        let (sup, store) = supervisor();
        let outcome = sup
            .start(
                "report",
                job_unit(|ctx| async move {
                    ctx.log.step(1, "working").await.map_err(|e| e.to_string())?;
                    Ok(Some(json!({"rows": 3})))
                }),
            )
            .await;
        let job_id = outcome.job_id().unwrap();

        let job = wait_terminal(&store, job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_summary, Some(json!({"rows": 3})));
        assert!(job.completed_at.is_some());

        let levels: Vec<_> = store
            .since(job_id, 0, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.level)
            .collect();
        assert_eq!(levels, [LogLevel::Info, LogLevel::Success]);
    }

    #[tokio::test]
    async fn failing_unit_marks_job_failed() {
        let (sup, store) = supervisor();
        let outcome = sup
            .start("sync", job_unit(|_| async { Err("upstream down".to_string()) }))
            .await;
        let job = wait_terminal(&store, outcome.job_id().unwrap()).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("upstream down"));
    }

    #[tokio::test]
    async fn panicking_unit_marks_job_failed() {
        let (sup, store) = supervisor();
        let outcome = sup.start("sync", job_unit(|_| explode())).await;
        let job = wait_terminal(&store, outcome.job_id().unwrap()).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("exploded"));

        // The type is free again.
        assert!(!sup.is_running("sync").await.unwrap());
    }

    // ---- Test: stop ----

    #[tokio::test]
    async fn stop_fails_job_and_cancels_unit() {
        let (sup, store) = supervisor();
        let observed = Arc::new(Notify::new());
        let seen = observed.clone();
        let outcome = sup
            .start(
                "long",
                job_unit(move |ctx| async move {
                    ctx.cancel.cancelled().await;
                    seen.notify_one();
                    Err("cancelled".to_string())
                }),
            )
            .await;
        let job_id = outcome.job_id().unwrap();

        let stopped = sup.stop(job_id).await.unwrap();
        assert_eq!(stopped.status, JobStatus::Failed);
        assert_eq!(stopped.error_message.as_deref(), Some(STOPPED_BY_USER));

        tokio::time::timeout(Duration::from_secs(2), observed.notified())
            .await
            .expect("unit should observe cancellation");

        // The unit's own failure does not overwrite the stop reason.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let job = JobStore::find(&*store, job_id).await.unwrap().unwrap();
        assert_eq!(job.error_message.as_deref(), Some(STOPPED_BY_USER));

        let entries = store.since(job_id, 0, 10).await.unwrap();
        assert_eq!(entries[0].level, LogLevel::Warning);
    }

    #[tokio::test]
    async fn stop_on_finished_job_is_unchanged() {
        let (sup, store) = supervisor();
        let outcome = sup.start("quick", job_unit(|_| async { Ok(None) })).await;
        let job_id = outcome.job_id().unwrap();
        let finished = wait_terminal(&store, job_id).await;

        let after = sup.stop(job_id).await.unwrap();
        assert_eq!(after, finished);
    }

    #[tokio::test]
    async fn stop_unknown_job_is_not_found() {
        let (sup, _) = supervisor();
        assert_matches!(sup.stop(404).await, Err(CoreError::NotFound { .. }));
    }

    /// Job store wrapper that slows `find` and can fail a job the moment it
    /// is created, as a `stop` racing `start` would.
    struct Hooked {
        inner: Arc<MemoryStore>,
        find_delay: Duration,
        stop_on_create: bool,
    }

    #[async_trait::async_trait]
    impl JobStore for Hooked {
        async fn create_running(&self, job_type: &str) -> CoreResult<CreateOutcome> {
            let outcome = self.inner.create_running(job_type).await?;
            if let (true, CreateOutcome::Created(job)) = (self.stop_on_create, &outcome) {
                self.inner
                    .finish(job.id, JobStatus::Failed, Some(STOPPED_BY_USER), None)
                    .await?;
            }
            Ok(outcome)
        }

        async fn find(&self, id: DbId) -> CoreResult<Option<Job>> {
            tokio::time::sleep(self.find_delay).await;
            JobStore::find(&*self.inner, id).await
        }

        async fn find_running(&self, job_type: &str) -> CoreResult<Option<Job>> {
            self.inner.find_running(job_type).await
        }

        async fn list(&self, limit: i64) -> CoreResult<Vec<Job>> {
            JobStore::list(&*self.inner, limit).await
        }

        async fn finish(
            &self,
            id: DbId,
            status: JobStatus,
            error_message: Option<&str>,
            result_summary: Option<&Value>,
        ) -> CoreResult<Option<StatusUpdate>> {
            self.inner
                .finish(id, status, error_message, result_summary)
                .await
        }

        async fn fail_all_running(&self, reason: &str) -> CoreResult<u64> {
            self.inner.fail_all_running(reason).await
        }
    }

    fn slow_supervisor() -> (JobSupervisor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let jobs = Arc::new(Hooked {
            inner: store.clone(),
            find_delay: Duration::from_millis(50),
            stop_on_create: false,
        });
        (JobSupervisor::new(jobs, store.clone()), store)
    }

    async fn log_lines(store: &MemoryStore, job_id: DbId) -> Vec<(LogLevel, String)> {
        store
            .since(job_id, 0, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.level, e.message))
            .collect()
    }

    #[tokio::test]
    async fn unit_finishing_during_stop_leaves_only_the_stop_entry() {
        let (sup, store) = slow_supervisor();
        let release = Arc::new(Notify::new());
        let job_id = sup
            .start("race", blocked_unit(release.clone()))
            .await
            .job_id()
            .unwrap();

        let stopper = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.stop(job_id).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        release.notify_one();

        let stopped = stopper.await.unwrap().unwrap();
        assert_eq!(stopped.error_message.as_deref(), Some(STOPPED_BY_USER));

        // Let the unit's completion run to its end.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let job = JobStore::find(&*store, job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(STOPPED_BY_USER));
        assert_eq!(
            log_lines(&store, job_id).await,
            [(LogLevel::Warning, "Stop requested by user".to_string())]
        );
    }

    #[tokio::test]
    async fn stop_during_completion_returns_the_completed_job() {
        let (sup, store) = slow_supervisor();
        let release = Arc::new(Notify::new());
        let job_id = sup
            .start("race", blocked_unit(release.clone()))
            .await
            .job_id()
            .unwrap();

        release.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after = sup.stop(job_id).await.unwrap();

        assert_eq!(after.status, JobStatus::Completed);
        assert_eq!(
            log_lines(&store, job_id).await,
            [(LogLevel::Success, "Job completed".to_string())]
        );
    }

    #[tokio::test]
    async fn stop_before_token_registration_still_cancels_the_unit() {
        let store = Arc::new(MemoryStore::new());
        let jobs = Arc::new(Hooked {
            inner: store.clone(),
            find_delay: Duration::ZERO,
            stop_on_create: true,
        });
        let sup = JobSupervisor::new(jobs, store.clone());

        let observed = Arc::new(Notify::new());
        let seen = observed.clone();
        let outcome = sup
            .start(
                "early",
                job_unit(move |ctx| async move {
                    ctx.cancel.cancelled().await;
                    seen.notify_one();
                    Err("cancelled".to_string())
                }),
            )
            .await;
        let job_id = assert_matches!(outcome, StartOutcome::Started { job_id } => job_id);

        tokio::time::timeout(Duration::from_secs(2), observed.notified())
            .await
            .expect("unit should observe cancellation");
        tokio::time::sleep(Duration::from_millis(20)).await;
        let job = JobStore::find(&*store, job_id).await.unwrap().unwrap();
        assert_eq!(job.error_message.as_deref(), Some(STOPPED_BY_USER));
    }

    // ---- Test: update_status ----

    #[tokio::test]
    async fn update_status_is_write_once() {
        let (sup, _) = supervisor();
        let release = Arc::new(Notify::new());
        let job_id = sup
            .start("sync", blocked_unit(release.clone()))
            .await
            .job_id()
            .unwrap();

        assert_matches!(
            sup.update_status(job_id, JobStatus::Running, None, None).await,
            Err(CoreError::Validation(_))
        );

        let first = sup
            .update_status(job_id, JobStatus::Completed, None, Some(&json!(1)))
            .await
            .unwrap();
        assert_matches!(first, StatusUpdate::Applied(_));

        let second = sup
            .update_status(job_id, JobStatus::Failed, Some("late"), None)
            .await
            .unwrap();
        assert_matches!(second, StatusUpdate::AlreadyTerminal(ref job) if job.status == JobStatus::Completed);
        release.notify_one();
    }

    // ---- Test: recovery and shutdown ----

    #[tokio::test]
    async fn recover_orphans_frees_job_types() {
        let store = Arc::new(MemoryStore::new());
        store.create_running("sync").await.unwrap();
        let sup = JobSupervisor::new(store.clone(), store.clone());

        assert!(sup.is_running("sync").await.unwrap());
        assert_eq!(sup.recover_orphans().await.unwrap(), 1);
        assert!(!sup.is_running("sync").await.unwrap());
    }

    #[tokio::test]
    async fn shutdown_cancels_units_and_rejects_new_starts() {
        let (sup, store) = supervisor();
        let job_id = sup
            .start(
                "long",
                job_unit(|ctx| async move {
                    ctx.cancel.cancelled().await;
                    Err("cancelled at shutdown".to_string())
                }),
            )
            .await
            .job_id()
            .unwrap();

        assert!(sup.shutdown(Duration::from_secs(2)).await);
        let job = JobStore::find(&*store, job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);

        assert_matches!(
            sup.start("other", job_unit(|_| async { Ok(None) })).await,
            StartOutcome::Error { .. }
        );
    }
}
