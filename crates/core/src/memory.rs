//! In-process implementation of every store trait.
//!
//! Used when no `DATABASE_URL` is configured and by the test suites. A
//! single async mutex guards the whole state, so every compound
//! check-then-write operation is atomic.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::artifact::{Artifact, CreateArtifact, HttpMethod, UpdateArtifact};
use crate::error::{CoreError, CoreResult};
use crate::execution::ExecutionRecord;
use crate::job::{CreateOutcome, Job, JobStatus, NewLogEntry, ProgressLogEntry, StatusUpdate};
use crate::request_log::{NewRequestLog, RequestLogEntry, DEFAULT_REQUEST_LOG_CAPACITY};
use crate::store::{ArtifactStore, ExecutionStore, JobStore, ProgressLogStore, RequestLogStore};
use crate::types::DbId;

#[derive(Default)]
struct State {
    artifacts: BTreeMap<DbId, Artifact>,
    next_artifact_id: DbId,
    jobs: BTreeMap<DbId, Job>,
    next_job_id: DbId,
    logs: HashMap<DbId, Vec<ProgressLogEntry>>,
    next_log_id: DbId,
    executions: HashMap<Uuid, ExecutionRecord>,
    requests: VecDeque<RequestLogEntry>,
    next_request_id: DbId,
}

impl State {
    fn next_id(counter: &mut DbId) -> DbId {
        *counter += 1;
        *counter
    }

    fn route_taken(&self, path: &str, method: HttpMethod, except: Option<DbId>) -> bool {
        self.artifacts
            .values()
            .any(|a| a.path == path && a.method == method && Some(a.id) != except)
    }
}

/// Volatile store; everything is lost when the process exits.
pub struct MemoryStore {
    state: Mutex<State>,
    request_log_capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_request_log_capacity(DEFAULT_REQUEST_LOG_CAPACITY)
    }

    pub fn with_request_log_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            request_log_capacity: capacity.max(1),
        }
    }
}

fn route_conflict(path: &str, method: HttpMethod) -> CoreError {
    CoreError::Conflict(format!("An artifact already serves {method} {path}"))
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn list(&self) -> CoreResult<Vec<Artifact>> {
        let state = self.state.lock().await;
        Ok(state.artifacts.values().cloned().collect())
    }

    async fn get(&self, id: DbId) -> CoreResult<Option<Artifact>> {
        Ok(self.state.lock().await.artifacts.get(&id).cloned())
    }

    async fn resolve(&self, path: &str, method: HttpMethod) -> CoreResult<Option<Artifact>> {
        let state = self.state.lock().await;
        Ok(state
            .artifacts
            .values()
            .find(|a| a.enabled && a.path == path && a.method == method)
            .cloned())
    }

    async fn create(&self, input: &CreateArtifact) -> CoreResult<Artifact> {
        let mut state = self.state.lock().await;
        if state.route_taken(&input.path, input.method, None) {
            return Err(route_conflict(&input.path, input.method));
        }
        let now = Utc::now();
        let artifact = Artifact {
            id: State::next_id(&mut state.next_artifact_id),
            name: input.name.clone(),
            description: input.description.clone(),
            path: input.path.clone(),
            method: input.method,
            source: input.source.clone(),
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        state.artifacts.insert(artifact.id, artifact.clone());
        Ok(artifact)
    }

    async fn update(&self, id: DbId, input: &UpdateArtifact) -> CoreResult<Option<Artifact>> {
        let mut state = self.state.lock().await;
        let Some(current) = state.artifacts.get(&id) else {
            return Ok(None);
        };
        let mut next = current.clone();
        input.apply_to(&mut next, Utc::now());
        if state.route_taken(&next.path, next.method, Some(id)) {
            return Err(route_conflict(&next.path, next.method));
        }
        state.artifacts.insert(id, next.clone());
        Ok(Some(next))
    }

    async fn delete(&self, id: DbId) -> CoreResult<bool> {
        Ok(self.state.lock().await.artifacts.remove(&id).is_some())
    }

    async fn toggle(&self, id: DbId) -> CoreResult<Option<Artifact>> {
        let mut state = self.state.lock().await;
        Ok(state.artifacts.get_mut(&id).map(|a| {
            a.enabled = !a.enabled;
            a.updated_at = Utc::now();
            a.clone()
        }))
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_running(&self, job_type: &str) -> CoreResult<CreateOutcome> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .jobs
            .values()
            .find(|j| j.job_type == job_type && j.status == JobStatus::Running)
        {
            return Ok(CreateOutcome::AlreadyRunning(existing.clone()));
        }
        let job = Job {
            id: State::next_id(&mut state.next_job_id),
            job_type: job_type.to_string(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            result_summary: None,
        };
        state.jobs.insert(job.id, job.clone());
        Ok(CreateOutcome::Created(job))
    }

    async fn find(&self, id: DbId) -> CoreResult<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn find_running(&self, job_type: &str) -> CoreResult<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .find(|j| j.job_type == job_type && j.status == JobStatus::Running)
            .cloned())
    }

    async fn list(&self, limit: i64) -> CoreResult<Vec<Job>> {
        let state = self.state.lock().await;
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(state.jobs.values().rev().take(take).cloned().collect())
    }

    async fn finish(
        &self,
        id: DbId,
        status: JobStatus,
        error_message: Option<&str>,
        result_summary: Option<&serde_json::Value>,
    ) -> CoreResult<Option<StatusUpdate>> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if job.status.is_terminal() {
            return Ok(Some(StatusUpdate::AlreadyTerminal(job.clone())));
        }
        job.status = status;
        job.completed_at = Some(Utc::now());
        job.error_message = error_message.map(str::to_string);
        job.result_summary = result_summary.cloned();
        Ok(Some(StatusUpdate::Applied(job.clone())))
    }

    async fn fail_all_running(&self, reason: &str) -> CoreResult<u64> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut touched = 0;
        for job in state
            .jobs
            .values_mut()
            .filter(|j| j.status == JobStatus::Running)
        {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            job.error_message = Some(reason.to_string());
            touched += 1;
        }
        Ok(touched)
    }
}

// ---------------------------------------------------------------------------
// Progress log
// ---------------------------------------------------------------------------

#[async_trait]
impl ProgressLogStore for MemoryStore {
    async fn append(&self, entry: NewLogEntry) -> CoreResult<ProgressLogEntry> {
        let mut state = self.state.lock().await;
        if !state.jobs.contains_key(&entry.job_id) {
            return Err(CoreError::not_found("job", entry.job_id));
        }
        let stored = ProgressLogEntry {
            id: State::next_id(&mut state.next_log_id),
            job_id: entry.job_id,
            level: entry.level,
            message: entry.message,
            step_number: entry.step_number,
            created_at: Utc::now(),
        };
        state
            .logs
            .entry(stored.job_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn since(
        &self,
        job_id: DbId,
        after_id: DbId,
        limit: i64,
    ) -> CoreResult<Vec<ProgressLogEntry>> {
        let state = self.state.lock().await;
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .logs
            .get(&job_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.id > after_id)
                    .take(take)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn record(&self, record: &ExecutionRecord) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        state
            .executions
            .insert(record.correlation_id, record.clone());
        Ok(())
    }

    async fn find(&self, correlation_id: Uuid) -> CoreResult<Option<ExecutionRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .executions
            .get(&correlation_id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Request log
// ---------------------------------------------------------------------------

#[async_trait]
impl RequestLogStore for MemoryStore {
    async fn append(&self, entry: NewRequestLog) -> CoreResult<()> {
        let entry = entry.truncate_body();
        let mut state = self.state.lock().await;
        let stored = RequestLogEntry {
            id: State::next_id(&mut state.next_request_id),
            timestamp: entry.timestamp,
            method: entry.method,
            path: entry.path,
            query_params: entry.query_params,
            headers: entry.headers,
            client_ip: entry.client_ip,
            status_code: entry.status_code,
            response_body: entry.response_body,
            response_time_ms: entry.response_time_ms,
        };
        state.requests.push_back(stored);
        while state.requests.len() > self.request_log_capacity {
            state.requests.pop_front();
        }
        Ok(())
    }

    async fn list(&self, limit: i64) -> CoreResult<Vec<RequestLogEntry>> {
        let state = self.state.lock().await;
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(state.requests.iter().rev().take(take).cloned().collect())
    }

    async fn clear(&self) -> CoreResult<u64> {
        let mut state = self.state.lock().await;
        let cleared = state.requests.len() as u64;
        state.requests.clear();
        Ok(cleared)
    }
}
