use sqlx::FromRow;
use snipgate_core::artifact::Artifact;
use snipgate_core::error::CoreError;
use snipgate_core::types::{DbId, Timestamp};

use super::corrupt;

/// A row from the `artifacts` table.
#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub path: String,
    pub method: String,
    pub source: String,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = CoreError;

    fn try_from(row: ArtifactRow) -> Result<Self, Self::Error> {
        Ok(Artifact {
            method: row.method.parse().map_err(|e| corrupt("artifacts", e))?,
            id: row.id,
            name: row.name,
            description: row.description,
            path: row.path,
            source: row.source,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
