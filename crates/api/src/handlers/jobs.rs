//! Handlers for the `/api/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use snipgate_core::error::CoreError;
use snipgate_core::job::{Job, StartOutcome};
use snipgate_core::store::{
    clamp_limit, DEFAULT_JOB_PAGE, DEFAULT_LOG_BATCH, MAX_JOB_PAGE, MAX_LOG_BATCH,
};
use snipgate_core::types::DbId;

use crate::error::{AppError, AppResult};
use crate::query::{JobStreamParams, LimitParams, LogCursorParams};
use crate::response::DataResponse;
use crate::state::AppState;
use crate::stream::sse;

/// Maximum accepted length of a job type tag.
const MAX_JOB_TYPE_LEN: usize = 100;

/// Request body for `POST /api/jobs`.
#[derive(Debug, Deserialize)]
pub struct StartJob {
    pub job_type: String,
    pub source: String,
}

async fn find_job(state: &AppState, job_id: DbId) -> AppResult<Job> {
    state
        .stores
        .jobs
        .find(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Job", job_id)))
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// POST /api/jobs
///
/// Launch `source` as a snippet job. 202 when started, 200 when a job of the
/// same type is already running (the repeat is a no-op), 503 when the job
/// could not be created.
pub async fn start_job(
    State(state): State<AppState>,
    Json(input): Json<StartJob>,
) -> AppResult<impl IntoResponse> {
    let job_type = input.job_type.trim();
    if job_type.is_empty() || job_type.len() > MAX_JOB_TYPE_LEN {
        return Err(AppError::BadRequest(format!(
            "job_type must be 1 to {MAX_JOB_TYPE_LEN} characters"
        )));
    }
    if input.source.trim().is_empty() {
        return Err(AppError::BadRequest("source is required".into()));
    }

    let outcome = state.runtime.start_snippet_job(job_type, &input.source).await;
    let status = match outcome {
        StartOutcome::Started { .. } => StatusCode::ACCEPTED,
        StartOutcome::AlreadyRunning { .. } => StatusCode::OK,
        StartOutcome::Error { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    Ok((status, Json(DataResponse { data: outcome })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/jobs
///
/// Most recent first, `?limit=` clamped to 1..=100 (default 50).
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> AppResult<impl IntoResponse> {
    let limit = clamp_limit(params.limit, DEFAULT_JOB_PAGE, MAX_JOB_PAGE);
    let jobs = state.stores.jobs.list(limit).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/jobs/{id}/logs
///
/// Entries after `?after_id=` in ascending order, `?limit=` clamped to
/// 1..=1000 (default 200).
pub async fn get_job_logs(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Query(params): Query<LogCursorParams>,
) -> AppResult<impl IntoResponse> {
    find_job(&state, job_id).await?;
    let limit = clamp_limit(params.limit, DEFAULT_LOG_BATCH, MAX_LOG_BATCH);
    let entries = state
        .stores
        .logs
        .since(job_id, params.after_id.unwrap_or(0), limit)
        .await?;
    Ok(Json(DataResponse { data: entries }))
}

/// GET /api/jobs/{id}/stream
///
/// SSE live log stream. Resumes after `Last-Event-ID` or `?last_seen_id=`,
/// otherwise starts at the beginning of the log.
pub async fn stream_job_logs(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Query(params): Query<JobStreamParams>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    find_job(&state, job_id).await?;
    let cursor = sse::last_event_id::<DbId>(&headers)?
        .or(params.last_seen_id)
        .unwrap_or(0);
    Ok(sse::job_stream(&state, job_id, cursor))
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

/// POST /api/jobs/{id}/stop
///
/// Fails a running job with "stopped by user" and cancels its token. A job
/// that is not running is returned unchanged. Snippet jobs are preempted at
/// their next interpreter tick; native units only stop if they poll their
/// token.
pub async fn stop_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.runtime.supervisor().stop(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}
