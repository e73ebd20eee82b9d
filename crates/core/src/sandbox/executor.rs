//! Bounded execution pool.
//!
//! Manages the full lifecycle of one run:
//! 1. Open the output buffer under a fresh correlation id.
//! 2. Wait for a worker permit.
//! 3. Run the engine on a blocking worker.
//! 4. Persist the [`ExecutionRecord`].
//! 5. Discard the buffer.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::capability::Capabilities;
use super::engine::SnippetEngine;
use super::error::SnippetError;
use crate::execution::{ExecutionRecord, ExecutionResult};
use crate::output::{OutputBuffers, OutputCapture};
use crate::store::ExecutionStore;
use crate::types::DbId;

/// One unit of work for the executor.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub source: String,
    pub capabilities: Capabilities,
    /// Registered artifact being served, `None` for ad-hoc runs.
    pub artifact_id: Option<DbId>,
}

/// Runs snippets on at most `max_concurrent` blocking workers at once.
#[derive(Clone)]
pub struct Executor {
    name: &'static str,
    engine: SnippetEngine,
    buffers: Arc<OutputBuffers>,
    executions: Arc<dyn ExecutionStore>,
    permits: Arc<Semaphore>,
}

impl Executor {
    pub fn new(
        name: &'static str,
        engine: SnippetEngine,
        buffers: Arc<OutputBuffers>,
        executions: Arc<dyn ExecutionStore>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            name,
            engine,
            buffers,
            executions,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn buffers(&self) -> &Arc<OutputBuffers> {
        &self.buffers
    }

    /// Run and wait for the result. The calling task only suspends; the
    /// interpreter runs on a blocking worker.
    pub async fn run(&self, request: ExecutionRequest) -> (Uuid, ExecutionResult) {
        let id = Uuid::now_v7();
        let capture = self.buffers.open(id);
        let result = self.drive(id, capture, request).await;
        (id, result)
    }

    /// Start a run without waiting for it. The buffer exists before this
    /// returns, so the id can be tailed immediately.
    pub fn spawn(&self, request: ExecutionRequest) -> Uuid {
        let id = Uuid::now_v7();
        let capture = self.buffers.open(id);
        let this = self.clone();
        tokio::spawn(async move {
            this.drive(id, capture, request).await;
        });
        id
    }

    /// Stop handing out permits. Runs already holding one finish normally.
    pub fn close(&self) {
        self.permits.close();
    }

    async fn drive(
        &self,
        id: Uuid,
        capture: OutputCapture,
        request: ExecutionRequest,
    ) -> ExecutionResult {
        let ExecutionRequest {
            source,
            capabilities,
            artifact_id,
        } = request;
        let started_at = Utc::now();
        let clock = Instant::now();
        let cell = capture.cell();

        let result = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => {
                let engine = self.engine.clone();
                let rt = Handle::current();
                let task = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let result = engine.run(&source, &capabilities, &capture, &rt);
                    capture.finish(result.success);
                    result
                });
                match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        let err = SnippetError::WorkerPanicked(e.to_string());
                        tracing::error!(
                            executor = self.name,
                            correlation_id = %id,
                            error = %err,
                            "Snippet worker lost"
                        );
                        cell.finish(false);
                        ExecutionResult::aborted(cell.read(), &err.to_string())
                    }
                }
            }
            Err(_) => {
                capture.finish(false);
                ExecutionResult::aborted(String::new(), &SnippetError::PoolClosed.to_string())
            }
        };

        let duration_ms = clock.elapsed().as_millis() as i64;
        let record = ExecutionRecord {
            correlation_id: id,
            artifact_id,
            result: result.clone(),
            started_at,
            duration_ms,
        };
        if let Err(e) = self.executions.record(&record).await {
            tracing::error!(correlation_id = %id, error = %e, "Failed to persist execution record");
        }
        self.buffers.discard(id);

        tracing::info!(
            executor = self.name,
            correlation_id = %id,
            artifact_id = ?artifact_id,
            success = result.success,
            duration_ms,
            "Snippet execution finished"
        );
        result
    }
}
