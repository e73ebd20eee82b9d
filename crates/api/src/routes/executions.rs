//! Route definitions for `/api/executions`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::executions;
use crate::state::AppState;

/// Routes mounted at `/api/executions`.
///
/// ```text
/// POST   /               -> start_execution
/// GET    /{id}           -> get_execution
/// GET    /{id}/stream    -> stream_execution (SSE)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(executions::start_execution))
        .route("/{id}", get(executions::get_execution))
        .route("/{id}/stream", get(executions::stream_execution))
}
