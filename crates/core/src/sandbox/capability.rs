//! The explicit capability surface handed to a snippet run.
//!
//! A snippet can only reach what its [`Capabilities`] carry. Nothing from the
//! host process is imported implicitly.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::execution::RequestContext;
use crate::job::StartOutcome;
use crate::supervisor::JobLogger;

/// One grantable operation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Capability {
    /// Read-only `request_data` constant.
    RequestData = 1 << 0,
    /// `print` into the execution's output buffer.
    Print = 1 << 1,
    /// `eprint` into stderr, `debug` into the server log.
    Diagnostics = 1 << 2,
    /// `start_job`, `is_running`.
    JobControl = 1 << 3,
    /// `log`, `step`, `is_cancelled`, `job_id` inside a job unit.
    JobLog = 1 << 4,
    /// `http_get` against an allow-list of hosts.
    Http = 1 << 5,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::RequestData,
        Capability::Print,
        Capability::Diagnostics,
        Capability::JobControl,
        Capability::JobLog,
        Capability::Http,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestData => "request_data",
            Self::Print => "print",
            Self::Diagnostics => "diagnostics",
            Self::JobControl => "job_control",
            Self::JobLog => "job_log",
            Self::Http => "http",
        }
    }
}

/// A small tagged set of [`Capability`] values.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, cap: Capability) {
        self.0 |= cap as u8;
    }

    pub fn contains(self, cap: Capability) -> bool {
        self.0 & cap as u8 != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Capability::as_str)).finish()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::empty();
        for cap in iter {
            set.insert(cap);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Collaborators reachable through capabilities
// ---------------------------------------------------------------------------

/// Job launching as seen from inside a snippet.
#[async_trait]
pub trait JobControl: Send + Sync {
    /// Launch `source` as a background snippet job of `job_type`.
    async fn start_job(&self, job_type: &str, source: &str) -> StartOutcome;

    async fn is_running(&self, job_type: &str) -> CoreResult<bool>;
}

/// The owning job of a snippet that runs as a job unit.
#[derive(Clone)]
pub struct JobScope {
    pub logger: JobLogger,
    pub cancel: CancellationToken,
}

/// Outbound HTTP restricted to named hosts.
#[derive(Clone)]
pub struct HttpAccess {
    client: reqwest::Client,
    allowed_hosts: Arc<[String]>,
}

impl HttpAccess {
    pub fn new(allowed_hosts: Vec<String>, timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        })
    }

    /// Parse `url` and check its host against the allow-list.
    pub fn check(&self, url: &str) -> Result<reqwest::Url, String> {
        let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid url '{url}': {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("scheme '{}' is not allowed", parsed.scheme()));
        }
        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
        if !self.allowed_hosts.iter().any(|h| *h == host) {
            return Err(format!("host '{host}' is not in the allow-list"));
        }
        Ok(parsed)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Everything one run may touch. Built per run by the caller.
#[derive(Clone, Default)]
pub struct Capabilities {
    granted: CapabilitySet,
    request_data: Value,
    job_control: Option<Arc<dyn JobControl>>,
    job: Option<JobScope>,
    http: Option<HttpAccess>,
}

impl Capabilities {
    /// Output only: `print`, `eprint` and `debug`.
    pub fn output_only() -> Self {
        Self {
            granted: [Capability::Print, Capability::Diagnostics]
                .into_iter()
                .collect(),
            request_data: Value::Null,
            ..Default::default()
        }
    }

    pub fn with_request(mut self, request: &RequestContext) -> Self {
        self.request_data = request.to_value();
        self.granted.insert(Capability::RequestData);
        self
    }

    pub fn with_job_control(mut self, control: Arc<dyn JobControl>) -> Self {
        self.job_control = Some(control);
        self.granted.insert(Capability::JobControl);
        self
    }

    pub fn with_job(mut self, scope: JobScope) -> Self {
        self.job = Some(scope);
        self.granted.insert(Capability::JobLog);
        self
    }

    /// Grants `http_get` only when `access` is present.
    pub fn with_http(mut self, access: Option<HttpAccess>) -> Self {
        if access.is_some() {
            self.granted.insert(Capability::Http);
        }
        self.http = access;
        self
    }

    pub fn granted(&self) -> CapabilitySet {
        self.granted
    }

    pub fn allows(&self, cap: Capability) -> bool {
        self.granted.contains(cap)
    }

    pub fn request_data(&self) -> &Value {
        &self.request_data
    }

    pub fn job_control(&self) -> Option<&Arc<dyn JobControl>> {
        self.job_control.as_ref()
    }

    pub fn job(&self) -> Option<&JobScope> {
        self.job.as_ref()
    }

    pub fn http(&self) -> Option<&HttpAccess> {
        self.http.as_ref()
    }

    /// Token observed by the engine's progress hook, if the run belongs to a job.
    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.job.as_ref().map(|j| &j.cancel)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("granted", &self.granted)
            .field("job_id", &self.job.as_ref().map(|j| j.logger.job_id()))
            .finish_non_exhaustive()
    }
}
