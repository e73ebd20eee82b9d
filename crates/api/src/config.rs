use std::str::FromStr;
use std::time::Duration;

use snipgate_core::error::CoreResult;
use snipgate_core::execution::SuccessPolicy;
use snipgate_core::publisher::PublisherConfig;
use snipgate_core::request_log::DEFAULT_REQUEST_LOG_CAPACITY;
use snipgate_core::runtime::RuntimeConfig;
use snipgate_core::sandbox::{HttpAccess, SandboxConfig};

/// Timeout applied to every `http_get` call made by a snippet.
const SNIPPET_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Drain budget for running jobs at shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Postgres URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub max_concurrent_executions: usize,
    pub max_concurrent_jobs: usize,
    /// Interpreter operation budget per run; `0` is unlimited.
    pub snippet_max_operations: u64,
    pub success_policy: SuccessPolicy,
    /// Hosts reachable through `http_get`. Empty leaves the capability ungranted.
    pub http_allowed_hosts: Vec<String>,
    pub stream_poll_interval_ms: u64,
    pub stream_failure_budget: u32,
    pub request_log_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".into()],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            database_url: None,
            db_max_connections: 20,
            max_concurrent_executions: 16,
            max_concurrent_jobs: 4,
            snippet_max_operations: SandboxConfig::default().max_operations,
            success_policy: SuccessPolicy::StderrEmpty,
            http_allowed_hosts: Vec::new(),
            stream_poll_interval_ms: 250,
            stream_failure_budget: 3,
            request_log_capacity: DEFAULT_REQUEST_LOG_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `HOST`                       | `0.0.0.0`               |
    /// | `PORT`                       | `3000`                  |
    /// | `CORS_ORIGINS`               | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                    |
    /// | `DATABASE_URL`               | unset (in-memory)       |
    /// | `DB_MAX_CONNECTIONS`         | `20`                    |
    /// | `MAX_CONCURRENT_EXECUTIONS`  | `16`                    |
    /// | `MAX_CONCURRENT_JOBS`        | `4`                     |
    /// | `SNIPPET_MAX_OPERATIONS`     | `5000000`               |
    /// | `SNIPPET_SUCCESS_POLICY`     | `stderr_empty`          |
    /// | `SNIPPET_HTTP_ALLOWED_HOSTS` | empty                   |
    /// | `STREAM_POLL_INTERVAL_MS`    | `250`                   |
    /// | `STREAM_FAILURE_BUDGET`      | `3`                     |
    /// | `REQUEST_LOG_CAPACITY`       | `1000`                  |
    ///
    /// Panics on malformed values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);

        let cors_origins = match std::env::var("CORS_ORIGINS") {
            Ok(raw) => split_list(&raw),
            Err(_) => defaults.cors_origins,
        };

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let http_allowed_hosts = std::env::var("SNIPPET_HTTP_ALLOWED_HOSTS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        Self {
            host,
            port: parse_env("PORT", defaults.port),
            cors_origins,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            shutdown_timeout_secs: parse_env(
                "SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout_secs,
            ),
            database_url,
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            max_concurrent_executions: parse_env(
                "MAX_CONCURRENT_EXECUTIONS",
                defaults.max_concurrent_executions,
            ),
            max_concurrent_jobs: parse_env("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs),
            snippet_max_operations: parse_env(
                "SNIPPET_MAX_OPERATIONS",
                defaults.snippet_max_operations,
            ),
            success_policy: parse_env("SNIPPET_SUCCESS_POLICY", defaults.success_policy),
            http_allowed_hosts,
            stream_poll_interval_ms: parse_env(
                "STREAM_POLL_INTERVAL_MS",
                defaults.stream_poll_interval_ms,
            ),
            stream_failure_budget: parse_env(
                "STREAM_FAILURE_BUDGET",
                defaults.stream_failure_budget,
            ),
            request_log_capacity: parse_env(
                "REQUEST_LOG_CAPACITY",
                defaults.request_log_capacity,
            ),
        }
    }

    /// Executor pools, sandbox limits and the `http_get` allow-list.
    pub fn runtime_config(&self) -> CoreResult<RuntimeConfig> {
        let http = if self.http_allowed_hosts.is_empty() {
            None
        } else {
            Some(HttpAccess::new(
                self.http_allowed_hosts.clone(),
                SNIPPET_HTTP_TIMEOUT,
            )?)
        };
        Ok(RuntimeConfig {
            sandbox: SandboxConfig {
                max_operations: self.snippet_max_operations,
                success_policy: self.success_policy,
                ..SandboxConfig::default()
            },
            max_concurrent_executions: self.max_concurrent_executions,
            max_concurrent_jobs: self.max_concurrent_jobs,
            http,
        })
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            poll_interval: Duration::from_millis(self.stream_poll_interval_ms.max(1)),
            failure_budget: self.stream_failure_budget,
            ..PublisherConfig::default()
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Read `key`, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}
