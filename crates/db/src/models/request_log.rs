use std::collections::BTreeMap;

use sqlx::FromRow;
use snipgate_core::error::CoreError;
use snipgate_core::request_log::RequestLogEntry;
use snipgate_core::types::{DbId, Timestamp};

use super::corrupt;

/// A row from the `request_logs` table.
#[derive(Debug, Clone, FromRow)]
pub struct RequestLogRow {
    pub id: DbId,
    pub logged_at: Timestamp,
    pub method: String,
    pub path: String,
    pub query_params: serde_json::Value,
    pub headers: serde_json::Value,
    pub client_ip: Option<String>,
    pub status_code: i32,
    pub response_body: String,
    pub response_time_ms: i64,
}

fn string_map(value: serde_json::Value) -> Result<BTreeMap<String, String>, CoreError> {
    serde_json::from_value(value).map_err(|e| corrupt("request_logs", e))
}

impl TryFrom<RequestLogRow> for RequestLogEntry {
    type Error = CoreError;

    fn try_from(row: RequestLogRow) -> Result<Self, Self::Error> {
        Ok(RequestLogEntry {
            id: row.id,
            timestamp: row.logged_at,
            method: row.method,
            path: row.path,
            query_params: string_map(row.query_params)?,
            headers: string_map(row.headers)?,
            client_ip: row.client_ip,
            status_code: u16::try_from(row.status_code)
                .map_err(|_| corrupt("request_logs", format!("status {}", row.status_code)))?,
            response_body: row.response_body,
            response_time_ms: row.response_time_ms,
        })
    }
}
