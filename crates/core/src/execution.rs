//! Execution inputs and outputs shared by the sandbox, the stores and the
//! HTTP surface.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::types::{CorrelationId, DbId, Timestamp};

/// The stable view of an inbound request exposed to snippets as `request_data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub path: String,
    pub method: String,
    pub query_params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body for POST/PUT/PATCH; `None` when absent or not JSON.
    pub body: Option<Value>,
}

impl RequestContext {
    /// Context used for ad-hoc runs that are not tied to an HTTP request.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// How `success` is derived from a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuccessPolicy {
    /// Any byte on the error channel marks the run failed.
    #[default]
    StderrEmpty,
    /// Only a fatal error fails the run; `eprint` diagnostics do not.
    NoFatalError,
}

impl FromStr for SuccessPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stderr_empty" => Ok(Self::StderrEmpty),
            "no_fatal_error" => Ok(Self::NoFatalError),
            other => Err(CoreError::Validation(format!(
                "Unknown success policy '{other}' (expected stderr_empty or no_fatal_error)"
            ))),
        }
    }
}

/// Structured outcome of one snippet run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Never null: a placeholder object stands in when the snippet produced nothing.
    pub value: Value,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ExecutionResult {
    /// Assemble a result, filling the placeholder and applying `policy`.
    pub fn assemble(
        value: Option<Value>,
        stdout: String,
        stderr: String,
        fatal: bool,
        policy: SuccessPolicy,
    ) -> Self {
        let success = match policy {
            SuccessPolicy::StderrEmpty => stderr.is_empty(),
            SuccessPolicy::NoFatalError => !fatal,
        };
        let value = match value {
            Some(v) if !v.is_null() => v,
            _ if fatal => placeholder_failed(),
            _ => placeholder_ok(),
        };
        Self {
            value,
            stdout,
            stderr,
            success,
        }
    }

    /// A failed result that never reached the engine (worker lost, pool closed).
    pub fn aborted(stdout: String, message: &str) -> Self {
        Self {
            value: placeholder_failed(),
            stdout,
            stderr: format!("{message}\n"),
            success: false,
        }
    }

    /// First line of `stderr`, used as a compact failure reason.
    pub fn error_headline(&self) -> Option<&str> {
        self.stderr.lines().find(|l| !l.trim().is_empty())
    }
}

fn placeholder_ok() -> Value {
    json!({"message": "Snippet executed successfully", "value_set": false})
}

fn placeholder_failed() -> Value {
    json!({"message": "Snippet failed before producing a value", "value_set": false})
}

/// The persisted fold of an execution buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub correlation_id: CorrelationId,
    pub artifact_id: Option<DbId>,
    #[serde(flatten)]
    pub result: ExecutionResult,
    pub started_at: Timestamp,
    pub duration_ms: i64,
}
