//! Repository layer: one unit struct per table.

pub mod artifact_repo;
pub mod execution_repo;
pub mod job_log_repo;
pub mod job_repo;
pub mod request_log_repo;

pub use artifact_repo::ArtifactRepo;
pub use execution_repo::ExecutionRepo;
pub use job_log_repo::JobLogRepo;
pub use job_repo::JobRepo;
pub use request_log_repo::RequestLogRepo;
