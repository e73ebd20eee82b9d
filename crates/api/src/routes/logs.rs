//! Route definitions for the `/api/logs` request log.

use axum::routing::get;
use axum::Router;

use crate::handlers::request_logs;
use crate::state::AppState;

/// Routes mounted at `/api/logs`.
///
/// ```text
/// GET    /    -> list_request_logs
/// DELETE /    -> clear_request_logs
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(request_logs::list_request_logs).delete(request_logs::clear_request_logs),
    )
}
