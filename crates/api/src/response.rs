//! Shared response envelope types for API handlers.
//!
//! Management, job and execution responses use a `{ "data": ... }` envelope.
//! Dynamic endpoint responses do not; see `handlers::dispatch`.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// ```ignore
/// Ok(Json(DataResponse { data: items }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
