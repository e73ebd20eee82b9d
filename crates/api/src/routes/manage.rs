//! Route definitions for the `/api/manage` artifact registry.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::artifacts;
use crate::state::AppState;

/// Routes mounted at `/api/manage`.
///
/// ```text
/// GET    /artifacts               -> list_artifacts
/// POST   /artifacts               -> create_artifact
/// GET    /artifacts/{id}          -> get_artifact
/// PUT    /artifacts/{id}          -> update_artifact
/// DELETE /artifacts/{id}          -> delete_artifact
/// POST   /artifacts/{id}/toggle   -> toggle_artifact
/// POST   /test                    -> test_source
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/artifacts",
            get(artifacts::list_artifacts).post(artifacts::create_artifact),
        )
        .route(
            "/artifacts/{id}",
            get(artifacts::get_artifact)
                .put(artifacts::update_artifact)
                .delete(artifacts::delete_artifact),
        )
        .route("/artifacts/{id}/toggle", post(artifacts::toggle_artifact))
        .route("/test", post(artifacts::test_source))
}
