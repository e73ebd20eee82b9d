//! Execution and observability engine for snippet-backed endpoints.
//!
//! No database or HTTP dependencies: persistence is reached through the
//! traits in [`store`], and the HTTP surface lives in `snipgate-api`.

pub mod artifact;
pub mod error;
pub mod execution;
pub mod job;
pub mod memory;
pub mod output;
pub mod publisher;
pub mod request_log;
pub mod runtime;
pub mod sandbox;
pub mod store;
pub mod supervisor;
pub mod types;
