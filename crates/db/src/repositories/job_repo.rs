//! Repository for the `jobs` table.
//!
//! Status literals always come from [`JobStatus::id`].

use sqlx::{PgConnection, PgPool};
use snipgate_core::job::JobStatus;
use snipgate_core::types::DbId;

use crate::models::job::JobRow;

/// Column list for `jobs` queries.
const COLUMNS: &str =
    "id, job_type, status_id, started_at, completed_at, error_message, result_summary";

pub struct JobRepo;

impl JobRepo {
    /// Serialize single-flight creation of `job_type` until the transaction ends.
    pub async fn lock_job_type(conn: &mut PgConnection, job_type: &str) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(job_type)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Lock and return the Running job of `job_type`, if any.
    pub async fn find_running_for_update(
        conn: &mut PgConnection,
        job_type: &str,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE job_type = $1 AND status_id = $2 FOR UPDATE"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_type)
            .bind(JobStatus::Running.id())
            .fetch_optional(conn)
            .await
    }

    pub async fn insert_running(
        conn: &mut PgConnection,
        job_type: &str,
    ) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (job_type, status_id) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_type)
            .bind(JobStatus::Running.id())
            .fetch_one(conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_running(
        pool: &PgPool,
        job_type: &str,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE job_type = $1 AND status_id = $2");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_type)
            .bind(JobStatus::Running.id())
            .fetch_optional(pool)
            .await
    }

    /// Most recent first.
    pub async fn list(pool: &PgPool, limit: i64) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs ORDER BY started_at DESC, id DESC LIMIT $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Write terminal fields unless the job is already terminal.
    ///
    /// Returns `None` when nothing was updated, either because the job does
    /// not exist or because it already finished.
    pub async fn finish(
        pool: &PgPool,
        id: DbId,
        status: JobStatus,
        error_message: Option<&str>,
        result_summary: Option<&serde_json::Value>,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, completed_at = NOW(), error_message = $3, result_summary = $4 \
             WHERE id = $1 AND status_id NOT IN ($5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(status.id())
            .bind(error_message)
            .bind(result_summary)
            .bind(JobStatus::Completed.id())
            .bind(JobStatus::Failed.id())
            .fetch_optional(pool)
            .await
    }

    /// Fail every Running job. Returns the number of rows touched.
    pub async fn fail_all_running(pool: &PgPool, reason: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $1, completed_at = NOW(), error_message = $2 \
             WHERE status_id = $3",
        )
        .bind(JobStatus::Failed.id())
        .bind(reason)
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
