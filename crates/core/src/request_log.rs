//! Request log entries for dynamic endpoint calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Response bodies are stored truncated to this many characters.
pub const MAX_LOGGED_BODY_CHARS: usize = 1000;

/// Default number of entries retained by the store.
pub const DEFAULT_REQUEST_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub id: DbId,
    pub timestamp: Timestamp,
    pub method: String,
    pub path: String,
    pub query_params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub client_ip: Option<String>,
    pub status_code: u16,
    pub response_body: String,
    pub response_time_ms: i64,
}

#[derive(Debug, Clone)]
pub struct NewRequestLog {
    pub timestamp: Timestamp,
    pub method: String,
    pub path: String,
    pub query_params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub client_ip: Option<String>,
    pub status_code: u16,
    pub response_body: String,
    pub response_time_ms: i64,
}

impl NewRequestLog {
    /// Cut the stored body down to [`MAX_LOGGED_BODY_CHARS`] characters.
    pub fn truncate_body(mut self) -> Self {
        if let Some((idx, _)) = self.response_body.char_indices().nth(MAX_LOGGED_BODY_CHARS) {
            self.response_body.truncate(idx);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(body: String) -> NewRequestLog {
        NewRequestLog {
            timestamp: chrono::Utc::now(),
            method: "GET".into(),
            path: "/x".into(),
            query_params: BTreeMap::new(),
            headers: BTreeMap::new(),
            client_ip: None,
            status_code: 200,
            response_body: body,
            response_time_ms: 1,
        }
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundaries() {
        let body = "é".repeat(1500);
        let logged = entry(body).truncate_body();
        assert_eq!(logged.response_body.chars().count(), MAX_LOGGED_BODY_CHARS);
    }

    #[test]
    fn short_bodies_are_untouched() {
        let logged = entry("ok".into()).truncate_body();
        assert_eq!(logged.response_body, "ok");
    }
}
