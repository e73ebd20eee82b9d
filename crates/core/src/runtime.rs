//! Facade over the executors and the job supervisor.
//!
//! Builds the capability set for each kind of run and launches snippet jobs.
//! Endpoint runs and job runs draw from separate pools, so long jobs cannot
//! starve request handling.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::error::CoreResult;
use crate::execution::{ExecutionResult, RequestContext};
use crate::job::StartOutcome;
use crate::output::OutputBuffers;
use crate::sandbox::{
    Capabilities, ExecutionRequest, Executor, HttpAccess, JobControl, JobScope, SandboxConfig,
    SnippetEngine,
};
use crate::store::{ExecutionStore, JobStore, ProgressLogStore};
use crate::supervisor::{job_unit, JobContext, JobSupervisor};

#[derive(Clone)]
pub struct RuntimeConfig {
    pub sandbox: SandboxConfig,
    pub max_concurrent_executions: usize,
    pub max_concurrent_jobs: usize,
    /// `None` leaves `http_get` ungranted.
    pub http: Option<HttpAccess>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            max_concurrent_executions: 16,
            max_concurrent_jobs: 4,
            http: None,
        }
    }
}

#[derive(Clone)]
pub struct Runtime {
    endpoints: Executor,
    jobs: Executor,
    supervisor: JobSupervisor,
    buffers: Arc<OutputBuffers>,
    http: Option<HttpAccess>,
}

impl Runtime {
    pub fn new(
        config: RuntimeConfig,
        jobs: Arc<dyn JobStore>,
        logs: Arc<dyn ProgressLogStore>,
        executions: Arc<dyn ExecutionStore>,
        buffers: Arc<OutputBuffers>,
    ) -> Self {
        let engine = SnippetEngine::new(config.sandbox);
        Self {
            endpoints: Executor::new(
                "endpoints",
                engine.clone(),
                Arc::clone(&buffers),
                Arc::clone(&executions),
                config.max_concurrent_executions,
            ),
            jobs: Executor::new(
                "jobs",
                engine,
                Arc::clone(&buffers),
                executions,
                config.max_concurrent_jobs,
            ),
            supervisor: JobSupervisor::new(jobs, logs),
            buffers,
            http: config.http,
        }
    }

    pub fn supervisor(&self) -> &JobSupervisor {
        &self.supervisor
    }

    pub fn buffers(&self) -> &Arc<OutputBuffers> {
        &self.buffers
    }

    /// Serve one request with a registered artifact.
    pub async fn run_artifact(
        &self,
        artifact: &Artifact,
        request: &RequestContext,
    ) -> (Uuid, ExecutionResult) {
        self.endpoints
            .run(ExecutionRequest {
                source: artifact.source.clone(),
                capabilities: self.endpoint_capabilities(request),
                artifact_id: Some(artifact.id),
            })
            .await
    }

    /// Run unregistered source and wait for it.
    pub async fn run_source(
        &self,
        source: &str,
        request: &RequestContext,
    ) -> (Uuid, ExecutionResult) {
        self.endpoints
            .run(ExecutionRequest {
                source: source.to_string(),
                capabilities: self.endpoint_capabilities(request),
                artifact_id: None,
            })
            .await
    }

    /// Run unregistered source without waiting. Returns the correlation id
    /// to tail.
    pub fn spawn_source(&self, source: &str, request: &RequestContext) -> Uuid {
        self.endpoints.spawn(ExecutionRequest {
            source: source.to_string(),
            capabilities: self.endpoint_capabilities(request),
            artifact_id: None,
        })
    }

    /// Launch `source` as a background job of `job_type`. The job's result
    /// summary is the snippet's value; a failed run fails the job with the
    /// first line of its stderr.
    pub async fn start_snippet_job(&self, job_type: &str, source: &str) -> StartOutcome {
        let this = self.clone();
        let source = source.to_string();
        let unit = job_unit(move |ctx: JobContext| async move {
            let request = ExecutionRequest {
                source,
                capabilities: this.job_capabilities(&ctx),
                artifact_id: None,
            };
            let (correlation_id, result) = this.jobs.run(request).await;
            tracing::debug!(job_id = ctx.job_id, %correlation_id, "Job snippet finished");
            if result.success {
                Ok(Some(result.value))
            } else {
                Err(result
                    .error_headline()
                    .unwrap_or("snippet failed")
                    .to_string())
            }
        });
        self.supervisor.start(job_type, unit).await
    }

    /// Stop accepting new runs.
    pub fn close(&self) {
        self.endpoints.close();
        self.jobs.close();
    }

    fn endpoint_capabilities(&self, request: &RequestContext) -> Capabilities {
        Capabilities::output_only()
            .with_request(request)
            .with_job_control(Arc::new(self.clone()))
            .with_http(self.http.clone())
    }

    fn job_capabilities(&self, ctx: &JobContext) -> Capabilities {
        Capabilities::output_only()
            .with_job_control(Arc::new(self.clone()))
            .with_job(JobScope {
                logger: ctx.log.clone(),
                cancel: ctx.cancel.clone(),
            })
            .with_http(self.http.clone())
    }
}

#[async_trait]
impl JobControl for Runtime {
    async fn start_job(&self, job_type: &str, source: &str) -> StartOutcome {
        self.start_snippet_job(job_type, source).await
    }

    async fn is_running(&self, job_type: &str) -> CoreResult<bool> {
        self.supervisor.is_running(job_type).await
    }
}
