//! snipgate HTTP surface.
//!
//! Exposes the building blocks (config, state, error handling, routes, SSE
//! adapters) so integration tests and the binary entrypoint share them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod query;
pub mod response;
pub mod router;
pub mod routes;
pub mod seed;
pub mod state;
pub mod stream;
