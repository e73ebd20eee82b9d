//! Live streaming adapters.

pub mod sse;
