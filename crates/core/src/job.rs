//! Background job model and the progress log entry types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Status ID type matching the SMALLINT `status_id` column.
pub type StatusId = i16;

/// Background job lifecycle status.
///
/// `(none) -> Pending -> Running -> {Completed, Failed}`. Nothing leaves a
/// terminal state. Discriminants match the `job_statuses` seed data.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending = 1,
    Running = 2,
    Completed = 3,
    Failed = 4,
}

impl JobStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::Running),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!("Unknown job status '{other}'"))),
        }
    }
}

/// A background job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: DbId,
    pub job_type: String,
    pub status: JobStatus,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub result_summary: Option<serde_json::Value>,
}

/// Result of `JobSupervisor::start`, serialized as `{"status": ..., "job_id": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { job_id: DbId },
    AlreadyRunning { job_id: DbId },
    Error { message: String },
}

impl StartOutcome {
    pub fn job_id(&self) -> Option<DbId> {
        match self {
            Self::Started { job_id } | Self::AlreadyRunning { job_id } => Some(*job_id),
            Self::Error { .. } => None,
        }
    }

    pub fn status_str(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::AlreadyRunning { .. } => "already_running",
            Self::Error { .. } => "error",
        }
    }
}

/// Outcome of the store-level atomic check-and-create.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Job),
    AlreadyRunning(Job),
}

/// Outcome of writing a terminal status.
///
/// Terminal fields are written once; a later write reports the job as it
/// already stands instead of overwriting it.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Applied(Job),
    AlreadyTerminal(Job),
}

impl StatusUpdate {
    pub fn job(&self) -> &Job {
        match self {
            Self::Applied(job) | Self::AlreadyTerminal(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            Self::Applied(job) | Self::AlreadyTerminal(job) => job,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "success" => Ok(Self::Success),
            other => Err(CoreError::Validation(format!("Unknown log level '{other}'"))),
        }
    }
}

/// An immutable, sequenced progress entry for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressLogEntry {
    /// Monotonic sequence id; entries of one job are totally ordered by it.
    pub id: DbId,
    pub job_id: DbId,
    pub level: LogLevel,
    pub message: String,
    pub step_number: Option<i32>,
    pub created_at: Timestamp,
}

/// DTO for appending a progress entry.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub job_id: DbId,
    pub level: LogLevel,
    pub message: String,
    pub step_number: Option<i32>,
}
