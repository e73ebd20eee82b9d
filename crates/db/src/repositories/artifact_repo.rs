//! Repository for the `artifacts` table.

use sqlx::{PgConnection, PgPool};
use snipgate_core::artifact::{Artifact, CreateArtifact};
use snipgate_core::types::DbId;

use crate::models::artifact::ArtifactRow;

/// Column list for `artifacts` queries.
const COLUMNS: &str = "id, name, description, path, method, source, enabled, created_at, updated_at";

pub struct ArtifactRepo;

impl ArtifactRepo {
    pub async fn list(pool: &PgPool) -> Result<Vec<ArtifactRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM artifacts ORDER BY id");
        sqlx::query_as::<_, ArtifactRow>(&query).fetch_all(pool).await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ArtifactRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM artifacts WHERE id = $1");
        sqlx::query_as::<_, ArtifactRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The enabled artifact serving `(path, method)`, if any.
    pub async fn resolve(
        pool: &PgPool,
        path: &str,
        method: &str,
    ) -> Result<Option<ArtifactRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM artifacts WHERE path = $1 AND method = $2 AND enabled"
        );
        sqlx::query_as::<_, ArtifactRow>(&query)
            .bind(path)
            .bind(method)
            .fetch_optional(pool)
            .await
    }

    /// Serialize writers of one `(path, method)` for the rest of the
    /// transaction, then lock and return any other artifact holding it.
    pub async fn lock_route(
        conn: &mut PgConnection,
        path: &str,
        method: &str,
        except: Option<DbId>,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ' ' || $2))")
            .bind(path)
            .bind(method)
            .execute(&mut *conn)
            .await?;
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM artifacts \
             WHERE path = $1 AND method = $2 AND ($3::BIGINT IS NULL OR id <> $3) \
             FOR UPDATE",
        )
        .bind(path)
        .bind(method)
        .bind(except)
        .fetch_optional(&mut *conn)
        .await
    }

    pub async fn lock_by_id(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<ArtifactRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM artifacts WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, ArtifactRow>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    pub async fn insert(
        conn: &mut PgConnection,
        input: &CreateArtifact,
    ) -> Result<ArtifactRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO artifacts (name, description, path, method, source) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ArtifactRow>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.path)
            .bind(input.method.as_str())
            .bind(&input.source)
            .fetch_one(conn)
            .await
    }

    /// Write every mutable column of `artifact`.
    pub async fn save(
        conn: &mut PgConnection,
        artifact: &Artifact,
    ) -> Result<ArtifactRow, sqlx::Error> {
        let query = format!(
            "UPDATE artifacts SET \
                name = $2, description = $3, path = $4, method = $5, \
                source = $6, enabled = $7, updated_at = $8 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ArtifactRow>(&query)
            .bind(artifact.id)
            .bind(&artifact.name)
            .bind(&artifact.description)
            .bind(&artifact.path)
            .bind(artifact.method.as_str())
            .bind(&artifact.source)
            .bind(artifact.enabled)
            .bind(artifact.updated_at)
            .fetch_one(conn)
            .await
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM artifacts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn toggle(pool: &PgPool, id: DbId) -> Result<Option<ArtifactRow>, sqlx::Error> {
        let query = format!(
            "UPDATE artifacts SET enabled = NOT enabled, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ArtifactRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
