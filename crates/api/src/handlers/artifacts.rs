//! Handlers for the `/api/manage` artifact registry.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use snipgate_core::artifact::{Artifact, CreateArtifact, UpdateArtifact};
use snipgate_core::error::CoreError;
use snipgate_core::execution::{ExecutionResult, RequestContext};
use snipgate_core::types::DbId;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/manage/test`.
#[derive(Debug, Deserialize)]
pub struct TestRun {
    pub source: String,
}

/// Response payload for `POST /api/manage/test`.
#[derive(Debug, Serialize)]
pub struct TestRunResult {
    pub correlation_id: Uuid,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

async fn find_artifact(state: &AppState, id: DbId) -> AppResult<Artifact> {
    state
        .stores
        .artifacts
        .get(id)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Artifact", id)))
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// GET /api/manage/artifacts
pub async fn list_artifacts(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let artifacts = state.stores.artifacts.list().await?;
    Ok(Json(DataResponse { data: artifacts }))
}

/// POST /api/manage/artifacts
///
/// Returns 201 with the artifact, 409 when `(path, method)` is already served.
pub async fn create_artifact(
    State(state): State<AppState>,
    Json(input): Json<CreateArtifact>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let artifact = state.stores.artifacts.create(&input).await?;

    tracing::info!(
        artifact_id = artifact.id,
        method = %artifact.method,
        path = %artifact.path,
        "Artifact created"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: artifact })))
}

/// GET /api/manage/artifacts/{id}
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let artifact = find_artifact(&state, id).await?;
    Ok(Json(DataResponse { data: artifact }))
}

/// PUT /api/manage/artifacts/{id}
///
/// Partial update; absent fields are left alone and `updated_at` is always
/// bumped.
pub async fn update_artifact(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateArtifact>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let artifact = state
        .stores
        .artifacts
        .update(id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Artifact", id)))?;

    tracing::info!(artifact_id = id, "Artifact updated");
    Ok(Json(DataResponse { data: artifact }))
}

/// DELETE /api/manage/artifacts/{id}
pub async fn delete_artifact(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if !state.stores.artifacts.delete(id).await? {
        return Err(AppError::Core(CoreError::not_found("Artifact", id)));
    }
    tracing::info!(artifact_id = id, "Artifact deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/manage/artifacts/{id}/toggle
pub async fn toggle_artifact(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let artifact = state
        .stores
        .artifacts
        .toggle(id)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Artifact", id)))?;

    tracing::info!(artifact_id = id, enabled = artifact.enabled, "Artifact toggled");
    Ok(Json(DataResponse { data: artifact }))
}

// ---------------------------------------------------------------------------
// Test run
// ---------------------------------------------------------------------------

/// POST /api/manage/test
///
/// Run `source` with an empty request context and return the full result,
/// failures included, with status 200.
pub async fn test_source(
    State(state): State<AppState>,
    Json(input): Json<TestRun>,
) -> AppResult<impl IntoResponse> {
    if input.source.trim().is_empty() {
        return Err(AppError::BadRequest("source is required".into()));
    }
    let (correlation_id, result) = state
        .runtime
        .run_source(&input.source, &RequestContext::empty())
        .await;
    Ok(Json(DataResponse {
        data: TestRunResult {
            correlation_id,
            result,
        },
    }))
}
