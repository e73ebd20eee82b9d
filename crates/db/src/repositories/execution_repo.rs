//! Repository for the `executions` table.

use sqlx::PgPool;
use snipgate_core::execution::ExecutionRecord;
use uuid::Uuid;

use crate::models::execution::ExecutionRow;

/// Column list for `executions` queries.
const COLUMNS: &str =
    "correlation_id, artifact_id, value, stdout, stderr, success, started_at, duration_ms";

pub struct ExecutionRepo;

impl ExecutionRepo {
    /// Insert a record. Records are immutable; a repeated id is ignored.
    pub async fn insert(pool: &PgPool, record: &ExecutionRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO executions \
                (correlation_id, artifact_id, value, stdout, stderr, success, started_at, duration_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (correlation_id) DO NOTHING",
        )
        .bind(record.correlation_id)
        .bind(record.artifact_id)
        .bind(&record.result.value)
        .bind(&record.result.stdout)
        .bind(&record.result.stderr)
        .bind(record.result.success)
        .bind(record.started_at)
        .bind(record.duration_ms)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find(
        pool: &PgPool,
        correlation_id: Uuid,
    ) -> Result<Option<ExecutionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM executions WHERE correlation_id = $1");
        sqlx::query_as::<_, ExecutionRow>(&query)
            .bind(correlation_id)
            .fetch_optional(pool)
            .await
    }
}
