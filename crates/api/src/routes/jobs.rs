//! Route definitions for the `/api/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/api/jobs`.
///
/// ```text
/// GET    /               -> list_jobs
/// POST   /               -> start_job
/// GET    /{id}           -> get_job
/// GET    /{id}/logs      -> get_job_logs
/// GET    /{id}/stream    -> stream_job_logs (SSE)
/// POST   /{id}/stop      -> stop_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::start_job))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/logs", get(jobs::get_job_logs))
        .route("/{id}/stream", get(jobs::stream_job_logs))
        .route("/{id}/stop", post(jobs::stop_job))
}
