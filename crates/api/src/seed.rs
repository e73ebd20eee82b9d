//! Startup seeding.

use snipgate_core::artifact::{CreateArtifact, HttpMethod};
use snipgate_core::error::{CoreError, CoreResult};
use snipgate_core::store::ArtifactStore;

pub const PING_PATH: &str = "/ping";

const PING_SOURCE: &str = r#"value = #{"status": "ok", "service": "snipgate"};"#;

/// Register the `GET /ping` artifact unless something already serves it.
///
/// Returns `true` when the artifact was created.
pub async fn seed_ping_artifact(artifacts: &dyn ArtifactStore) -> CoreResult<bool> {
    let taken = artifacts
        .list()
        .await?
        .iter()
        .any(|a| a.path == PING_PATH && a.method == HttpMethod::Get);
    if taken {
        return Ok(false);
    }

    let input = CreateArtifact {
        name: "Ping".into(),
        description: Some("Health check endpoint".into()),
        path: PING_PATH.into(),
        method: HttpMethod::Get,
        source: PING_SOURCE.into(),
    };
    match artifacts.create(&input).await {
        Ok(artifact) => {
            tracing::info!(artifact_id = artifact.id, "Seeded ping artifact");
            Ok(true)
        }
        // Another instance won the race.
        Err(CoreError::Conflict(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
