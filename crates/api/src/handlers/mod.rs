pub mod artifacts;
pub mod dispatch;
pub mod executions;
pub mod jobs;
pub mod request_logs;
