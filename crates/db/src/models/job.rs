use sqlx::FromRow;
use snipgate_core::error::CoreError;
use snipgate_core::job::{Job, JobStatus, ProgressLogEntry, StatusId};
use snipgate_core::types::{DbId, Timestamp};

use super::corrupt;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: DbId,
    pub job_type: String,
    pub status_id: StatusId,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub result_summary: Option<serde_json::Value>,
}

impl TryFrom<JobRow> for Job {
    type Error = CoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_id(row.status_id)
            .ok_or_else(|| corrupt("jobs", format!("unknown status_id {}", row.status_id)))?;
        Ok(Job {
            id: row.id,
            job_type: row.job_type,
            status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            result_summary: row.result_summary,
        })
    }
}

/// A row from the `job_logs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobLogRow {
    pub id: DbId,
    pub job_id: DbId,
    pub level: String,
    pub message: String,
    pub step_number: Option<i32>,
    pub created_at: Timestamp,
}

impl TryFrom<JobLogRow> for ProgressLogEntry {
    type Error = CoreError;

    fn try_from(row: JobLogRow) -> Result<Self, Self::Error> {
        Ok(ProgressLogEntry {
            level: row.level.parse().map_err(|e| corrupt("job_logs", e))?,
            id: row.id,
            job_id: row.job_id,
            message: row.message,
            step_number: row.step_number,
            created_at: row.created_at,
        })
    }
}
