//! Handlers for `/api/executions`: detached runs and their output.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use snipgate_core::error::CoreError;
use snipgate_core::execution::RequestContext;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::query::OutputStreamParams;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::stream::sse;

#[derive(Debug, Deserialize)]
pub struct StartExecution {
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ExecutionStarted {
    pub correlation_id: Uuid,
}

/// POST /api/executions
///
/// Start `source` without waiting. Returns 202 with the correlation id to
/// tail via `/api/executions/{id}/stream`.
pub async fn start_execution(
    State(state): State<AppState>,
    Json(input): Json<StartExecution>,
) -> AppResult<impl IntoResponse> {
    if input.source.trim().is_empty() {
        return Err(AppError::BadRequest("source is required".into()));
    }
    let correlation_id = state
        .runtime
        .spawn_source(&input.source, &RequestContext::empty());
    tracing::info!(%correlation_id, "Detached execution started");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: ExecutionStarted { correlation_id },
        }),
    ))
}

/// GET /api/executions/{id}
///
/// The persisted record. 404 until the run has finished.
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .stores
        .executions
        .find(id)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Execution", id)))?;
    Ok(Json(DataResponse { data: record }))
}

/// GET /api/executions/{id}/stream
///
/// SSE tail of the output buffer, resuming from `Last-Event-ID` (a byte
/// offset) or `?offset=`.
pub async fn stream_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<OutputStreamParams>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let offset = sse::last_event_id::<usize>(&headers)?
        .or(params.offset)
        .unwrap_or(0);
    Ok(sse::output_stream(&state, id, offset))
}
