//! Shared query parameter types for API handlers.

use serde::Deserialize;
use snipgate_core::types::DbId;

/// `?limit=`. Clamped by the handler with `clamp_limit`.
#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

/// `?after_id=&limit=` for progress log reads.
#[derive(Debug, Default, Deserialize)]
pub struct LogCursorParams {
    pub after_id: Option<DbId>,
    pub limit: Option<i64>,
}

/// `?last_seen_id=` for job log streams. `Last-Event-ID` takes precedence.
#[derive(Debug, Default, Deserialize)]
pub struct JobStreamParams {
    pub last_seen_id: Option<DbId>,
}

/// `?offset=` for execution output streams. `Last-Event-ID` takes precedence.
#[derive(Debug, Default, Deserialize)]
pub struct OutputStreamParams {
    pub offset: Option<usize>,
}
