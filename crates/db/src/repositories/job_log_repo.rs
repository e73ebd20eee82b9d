//! Repository for the append-only `job_logs` table.

use sqlx::PgPool;
use snipgate_core::job::NewLogEntry;
use snipgate_core::types::DbId;

use crate::models::job::JobLogRow;

/// Column list for `job_logs` queries.
const COLUMNS: &str = "id, job_id, level, message, step_number, created_at";

pub struct JobLogRepo;

impl JobLogRepo {
    pub async fn append(pool: &PgPool, entry: &NewLogEntry) -> Result<JobLogRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO job_logs (job_id, level, message, step_number) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobLogRow>(&query)
            .bind(entry.job_id)
            .bind(entry.level.as_str())
            .bind(&entry.message)
            .bind(entry.step_number)
            .fetch_one(pool)
            .await
    }

    /// Entries after `after_id`, ascending.
    pub async fn since(
        pool: &PgPool,
        job_id: DbId,
        after_id: DbId,
        limit: i64,
    ) -> Result<Vec<JobLogRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_logs \
             WHERE job_id = $1 AND id > $2 \
             ORDER BY id ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, JobLogRow>(&query)
            .bind(job_id)
            .bind(after_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
