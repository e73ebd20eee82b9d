//! Row types for each table, with conversions into the core domain types.

pub mod artifact;
pub mod execution;
pub mod job;
pub mod request_log;

use snipgate_core::error::CoreError;

/// A row holds a value the domain type cannot represent.
pub(crate) fn corrupt(table: &str, detail: impl std::fmt::Display) -> CoreError {
    CoreError::Internal(format!("Corrupt {table} row: {detail}"))
}
