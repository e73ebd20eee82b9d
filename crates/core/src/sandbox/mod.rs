//! Sandboxed snippet execution.
//!
//! - [`capability`]: the explicit surface a run may touch.
//! - [`engine`]: one synchronous run of the interpreter.
//! - [`executor`]: bounded worker pool, buffer lifecycle, persistence.

pub mod capability;
pub mod engine;
pub mod error;
pub mod executor;

pub use capability::{Capabilities, Capability, CapabilitySet, HttpAccess, JobControl, JobScope};
pub use engine::SnippetEngine;
pub use error::SnippetError;
pub use executor::{ExecutionRequest, Executor};

use crate::execution::SuccessPolicy;

/// Resource limits and policy applied to every run.
#[derive(Debug, Clone, Copy)]
pub struct SandboxConfig {
    /// Interpreter operation budget; `0` disables the limit.
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    pub success_policy: SuccessPolicy,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_operations: 5_000_000,
            max_call_levels: 64,
            max_string_size: 1024 * 1024,
            max_array_size: 100_000,
            max_map_size: 10_000,
            success_policy: SuccessPolicy::StderrEmpty,
        }
    }
}
