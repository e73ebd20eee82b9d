//! Handlers for the `/api/logs` request log.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use snipgate_core::store::clamp_limit;

use crate::error::AppResult;
use crate::query::LimitParams;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_REQUEST_LOG_PAGE: i64 = 100;
const MAX_REQUEST_LOG_PAGE: i64 = 1000;

#[derive(Debug, Serialize)]
pub struct Cleared {
    pub deleted: u64,
}

/// GET /api/logs
///
/// Newest first.
pub async fn list_request_logs(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> AppResult<impl IntoResponse> {
    let limit = clamp_limit(params.limit, DEFAULT_REQUEST_LOG_PAGE, MAX_REQUEST_LOG_PAGE);
    let entries = state.stores.request_logs.list(limit).await?;
    Ok(Json(DataResponse { data: entries }))
}

/// DELETE /api/logs
pub async fn clear_request_logs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let deleted = state.stores.request_logs.clear().await?;
    tracing::info!(deleted, "Request log cleared");
    Ok(Json(DataResponse {
        data: Cleared { deleted },
    }))
}
