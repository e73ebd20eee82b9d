pub mod executions;
pub mod health;
pub mod jobs;
pub mod logs;
pub mod manage;
