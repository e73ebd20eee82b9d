//! Storage seams.
//!
//! The engine only talks to persistence through these traits. `MemoryStore`
//! (this crate) and `PgStore` (`snipgate-db`) implement all of them.

use async_trait::async_trait;
use uuid::Uuid;

use crate::artifact::{Artifact, CreateArtifact, HttpMethod, UpdateArtifact};
use crate::error::CoreResult;
use crate::execution::ExecutionRecord;
use crate::job::{CreateOutcome, Job, JobStatus, NewLogEntry, ProgressLogEntry, StatusUpdate};
use crate::request_log::{NewRequestLog, RequestLogEntry};
use crate::types::DbId;

/// Default page size for job listings.
pub const DEFAULT_JOB_PAGE: i64 = 50;
/// Hard cap on job listing page size.
pub const MAX_JOB_PAGE: i64 = 100;
/// Default batch size for progress log reads.
pub const DEFAULT_LOG_BATCH: i64 = 200;
/// Hard cap on progress log batch size.
pub const MAX_LOG_BATCH: i64 = 1000;

/// Clamp a caller-supplied limit into `1..=max`, falling back to `default`.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

/// Artifact registry.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn list(&self) -> CoreResult<Vec<Artifact>>;

    async fn get(&self, id: DbId) -> CoreResult<Option<Artifact>>;

    /// Look up the enabled artifact serving `(path, method)`.
    async fn resolve(&self, path: &str, method: HttpMethod) -> CoreResult<Option<Artifact>>;

    /// Fails with `CoreError::Conflict` when `(path, method)` is taken.
    async fn create(&self, input: &CreateArtifact) -> CoreResult<Artifact>;

    async fn update(&self, id: DbId, input: &UpdateArtifact) -> CoreResult<Option<Artifact>>;

    async fn delete(&self, id: DbId) -> CoreResult<bool>;

    async fn toggle(&self, id: DbId) -> CoreResult<Option<Artifact>>;
}

/// Background job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically check for a Running job of `job_type` and create one if
    /// there is none.
    async fn create_running(&self, job_type: &str) -> CoreResult<CreateOutcome>;

    async fn find(&self, id: DbId) -> CoreResult<Option<Job>>;

    async fn find_running(&self, job_type: &str) -> CoreResult<Option<Job>>;

    /// Newest first.
    async fn list(&self, limit: i64) -> CoreResult<Vec<Job>>;

    /// Write the terminal fields of a job. `None` when the job does not exist.
    async fn finish(
        &self,
        id: DbId,
        status: JobStatus,
        error_message: Option<&str>,
        result_summary: Option<&serde_json::Value>,
    ) -> CoreResult<Option<StatusUpdate>>;

    /// Fail every Running job with `reason`. Returns the number of jobs touched.
    async fn fail_all_running(&self, reason: &str) -> CoreResult<u64>;
}

/// Append-only progress log.
#[async_trait]
pub trait ProgressLogStore: Send + Sync {
    async fn append(&self, entry: NewLogEntry) -> CoreResult<ProgressLogEntry>;

    /// Entries of `job_id` with `id > after_id`, ascending, at most `limit`.
    async fn since(
        &self,
        job_id: DbId,
        after_id: DbId,
        limit: i64,
    ) -> CoreResult<Vec<ProgressLogEntry>>;
}

/// Persisted execution records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn record(&self, record: &ExecutionRecord) -> CoreResult<()>;

    async fn find(&self, correlation_id: Uuid) -> CoreResult<Option<ExecutionRecord>>;
}

/// Request log for dynamic endpoints.
#[async_trait]
pub trait RequestLogStore: Send + Sync {
    async fn append(&self, entry: NewRequestLog) -> CoreResult<()>;

    /// Newest first.
    async fn list(&self, limit: i64) -> CoreResult<Vec<RequestLogEntry>>;

    async fn clear(&self) -> CoreResult<u64>;
}
