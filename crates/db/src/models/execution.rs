use sqlx::FromRow;
use snipgate_core::execution::{ExecutionRecord, ExecutionResult};
use snipgate_core::types::{DbId, Timestamp};
use uuid::Uuid;

/// A row from the `executions` table.
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionRow {
    pub correlation_id: Uuid,
    pub artifact_id: Option<DbId>,
    pub value: serde_json::Value,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub started_at: Timestamp,
    pub duration_ms: i64,
}

impl From<ExecutionRow> for ExecutionRecord {
    fn from(row: ExecutionRow) -> Self {
        ExecutionRecord {
            correlation_id: row.correlation_id,
            artifact_id: row.artifact_id,
            result: ExecutionResult {
                value: row.value,
                stdout: row.stdout,
                stderr: row.stderr,
                success: row.success,
            },
            started_at: row.started_at,
            duration_ms: row.duration_ms,
        }
    }
}
