//! [`PgStore`]: the Postgres implementation of the core store traits.

use async_trait::async_trait;
use chrono::Utc;
use snipgate_core::artifact::{Artifact, CreateArtifact, HttpMethod, UpdateArtifact};
use snipgate_core::error::{CoreError, CoreResult};
use snipgate_core::execution::ExecutionRecord;
use snipgate_core::job::{
    CreateOutcome, Job, JobStatus, NewLogEntry, ProgressLogEntry, StatusUpdate,
};
use snipgate_core::request_log::{NewRequestLog, RequestLogEntry, DEFAULT_REQUEST_LOG_CAPACITY};
use snipgate_core::store::{
    ArtifactStore, ExecutionStore, JobStore, ProgressLogStore, RequestLogStore,
};
use snipgate_core::types::DbId;
use uuid::Uuid;

use crate::error::{classify, is_foreign_key_violation, is_unique_violation};
use crate::repositories::{ArtifactRepo, ExecutionRepo, JobLogRepo, JobRepo, RequestLogRepo};
use crate::DbPool;

/// Partial unique index allowing one Running job per type.
const RUNNING_PER_TYPE_INDEX: &str = "uq_jobs_running_per_type";

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    request_log_capacity: i64,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_request_log_capacity(pool, DEFAULT_REQUEST_LOG_CAPACITY)
    }

    pub fn with_request_log_capacity(pool: DbPool, capacity: usize) -> Self {
        Self {
            pool,
            request_log_capacity: i64::try_from(capacity.max(1)).unwrap_or(i64::MAX),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn route_conflict(path: &str, method: HttpMethod) -> CoreError {
    CoreError::Conflict(format!("An artifact already serves {method} {path}"))
}

fn collect<R, T>(rows: Vec<R>) -> CoreResult<Vec<T>>
where
    T: TryFrom<R, Error = CoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[async_trait]
impl ArtifactStore for PgStore {
    async fn list(&self) -> CoreResult<Vec<Artifact>> {
        let rows = ArtifactRepo::list(&self.pool).await.map_err(classify)?;
        collect(rows)
    }

    async fn get(&self, id: DbId) -> CoreResult<Option<Artifact>> {
        ArtifactRepo::find_by_id(&self.pool, id)
            .await
            .map_err(classify)?
            .map(Artifact::try_from)
            .transpose()
    }

    async fn resolve(&self, path: &str, method: HttpMethod) -> CoreResult<Option<Artifact>> {
        ArtifactRepo::resolve(&self.pool, path, method.as_str())
            .await
            .map_err(classify)?
            .map(Artifact::try_from)
            .transpose()
    }

    async fn create(&self, input: &CreateArtifact) -> CoreResult<Artifact> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        let taken = ArtifactRepo::lock_route(&mut *tx, &input.path, input.method.as_str(), None)
            .await
            .map_err(classify)?;
        if taken.is_some() {
            return Err(route_conflict(&input.path, input.method));
        }
        let row = ArtifactRepo::insert(&mut *tx, input)
            .await
            .map_err(classify)?;
        tx.commit().await.map_err(classify)?;
        Artifact::try_from(row)
    }

    async fn update(&self, id: DbId, input: &UpdateArtifact) -> CoreResult<Option<Artifact>> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        let Some(row) = ArtifactRepo::lock_by_id(&mut *tx, id)
            .await
            .map_err(classify)?
        else {
            return Ok(None);
        };
        let mut next = Artifact::try_from(row)?;
        input.apply_to(&mut next, Utc::now());

        let taken = ArtifactRepo::lock_route(&mut *tx, &next.path, next.method.as_str(), Some(id))
            .await
            .map_err(classify)?;
        if taken.is_some() {
            return Err(route_conflict(&next.path, next.method));
        }
        let saved = ArtifactRepo::save(&mut *tx, &next)
            .await
            .map_err(classify)?;
        tx.commit().await.map_err(classify)?;
        Artifact::try_from(saved).map(Some)
    }

    async fn delete(&self, id: DbId) -> CoreResult<bool> {
        ArtifactRepo::delete(&self.pool, id).await.map_err(classify)
    }

    async fn toggle(&self, id: DbId) -> CoreResult<Option<Artifact>> {
        ArtifactRepo::toggle(&self.pool, id)
            .await
            .map_err(classify)?
            .map(Artifact::try_from)
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[async_trait]
impl JobStore for PgStore {
    async fn create_running(&self, job_type: &str) -> CoreResult<CreateOutcome> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        JobRepo::lock_job_type(&mut *tx, job_type)
            .await
            .map_err(classify)?;
        if let Some(existing) = JobRepo::find_running_for_update(&mut *tx, job_type)
            .await
            .map_err(classify)?
        {
            return Ok(CreateOutcome::AlreadyRunning(Job::try_from(existing)?));
        }

        match JobRepo::insert_running(&mut *tx, job_type).await {
            Ok(row) => {
                tx.commit().await.map_err(classify)?;
                Ok(CreateOutcome::Created(Job::try_from(row)?))
            }
            Err(e) if is_unique_violation(&e, RUNNING_PER_TYPE_INDEX) => {
                // Another writer bypassed the advisory lock; report its job.
                drop(tx);
                match self.find_running(job_type).await? {
                    Some(job) => Ok(CreateOutcome::AlreadyRunning(job)),
                    None => Err(classify(e)),
                }
            }
            Err(e) => Err(classify(e)),
        }
    }

    async fn find(&self, id: DbId) -> CoreResult<Option<Job>> {
        JobRepo::find_by_id(&self.pool, id)
            .await
            .map_err(classify)?
            .map(Job::try_from)
            .transpose()
    }

    async fn find_running(&self, job_type: &str) -> CoreResult<Option<Job>> {
        JobRepo::find_running(&self.pool, job_type)
            .await
            .map_err(classify)?
            .map(Job::try_from)
            .transpose()
    }

    async fn list(&self, limit: i64) -> CoreResult<Vec<Job>> {
        let rows = JobRepo::list(&self.pool, limit).await.map_err(classify)?;
        collect(rows)
    }

    async fn finish(
        &self,
        id: DbId,
        status: JobStatus,
        error_message: Option<&str>,
        result_summary: Option<&serde_json::Value>,
    ) -> CoreResult<Option<StatusUpdate>> {
        let applied = JobRepo::finish(&self.pool, id, status, error_message, result_summary)
            .await
            .map_err(classify)?;
        if let Some(row) = applied {
            return Ok(Some(StatusUpdate::Applied(Job::try_from(row)?)));
        }
        // Nothing updated: either missing or already terminal.
        Ok(JobStore::find(self, id).await?.map(StatusUpdate::AlreadyTerminal))
    }

    async fn fail_all_running(&self, reason: &str) -> CoreResult<u64> {
        JobRepo::fail_all_running(&self.pool, reason)
            .await
            .map_err(classify)
    }
}

// ---------------------------------------------------------------------------
// Progress log
// ---------------------------------------------------------------------------

#[async_trait]
impl ProgressLogStore for PgStore {
    async fn append(&self, entry: NewLogEntry) -> CoreResult<ProgressLogEntry> {
        match JobLogRepo::append(&self.pool, &entry).await {
            Ok(row) => ProgressLogEntry::try_from(row),
            Err(e) if is_foreign_key_violation(&e) => Err(CoreError::not_found("job", entry.job_id)),
            Err(e) => Err(classify(e)),
        }
    }

    async fn since(
        &self,
        job_id: DbId,
        after_id: DbId,
        limit: i64,
    ) -> CoreResult<Vec<ProgressLogEntry>> {
        let rows = JobLogRepo::since(&self.pool, job_id, after_id, limit)
            .await
            .map_err(classify)?;
        collect(rows)
    }
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

#[async_trait]
impl ExecutionStore for PgStore {
    async fn record(&self, record: &ExecutionRecord) -> CoreResult<()> {
        ExecutionRepo::insert(&self.pool, record)
            .await
            .map_err(classify)
    }

    async fn find(&self, correlation_id: Uuid) -> CoreResult<Option<ExecutionRecord>> {
        Ok(ExecutionRepo::find(&self.pool, correlation_id)
            .await
            .map_err(classify)?
            .map(ExecutionRecord::from))
    }
}

// ---------------------------------------------------------------------------
// Request log
// ---------------------------------------------------------------------------

#[async_trait]
impl RequestLogStore for PgStore {
    async fn append(&self, entry: NewRequestLog) -> CoreResult<()> {
        let entry = entry.truncate_body();
        RequestLogRepo::insert(&self.pool, &entry)
            .await
            .map_err(classify)?;
        let pruned = RequestLogRepo::trim(&self.pool, self.request_log_capacity)
            .await
            .map_err(classify)?;
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned request log");
        }
        Ok(())
    }

    async fn list(&self, limit: i64) -> CoreResult<Vec<RequestLogEntry>> {
        let rows = RequestLogRepo::list(&self.pool, limit)
            .await
            .map_err(classify)?;
        collect(rows)
    }

    async fn clear(&self) -> CoreResult<u64> {
        RequestLogRepo::clear(&self.pool).await.map_err(classify)
    }
}
