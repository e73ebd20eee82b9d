//! Live publisher: per-subscriber polling loops over job logs and execution
//! output.
//!
//! Each subscriber owns its cursor. A loop ticks every
//! [`PublisherConfig::poll_interval`], checks the sink before doing any work,
//! and races its sleep against the sink closing, so a disconnect ends the
//! loop within one interval and nothing is sent after it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::job::{Job, JobStatus, ProgressLogEntry};
use crate::output::{char_floor, BufferCell, OutputBuffers};
use crate::store::{ExecutionStore, JobStore, ProgressLogStore};
use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, Copy)]
pub struct PublisherConfig {
    pub poll_interval: Duration,
    /// Consecutive read failures tolerated before the stream gives up.
    pub failure_budget: u32,
    /// Maximum log entries fetched per tick.
    pub batch_size: i64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            failure_budget: 3,
            batch_size: 200,
        }
    }
}

/// One message to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Logs {
        entries: Vec<ProgressLogEntry>,
    },
    Output {
        offset: usize,
        chunk: String,
    },
    Heartbeat,
    Status {
        job_id: DbId,
        status: JobStatus,
        error_message: Option<String>,
        result_summary: Option<Value>,
        completed_at: Option<Timestamp>,
    },
    ExecutionFinished {
        correlation_id: Uuid,
        success: Option<bool>,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Logs { .. } => "logs",
            Self::Output { .. } => "output",
            Self::Heartbeat => "heartbeat",
            Self::Status { .. } => "status",
            Self::ExecutionFinished { .. } => "execution_finished",
            Self::Error { .. } => "error",
        }
    }

    /// Resume position after this event: the last log id, or the output
    /// byte offset.
    pub fn cursor(&self) -> Option<String> {
        match self {
            Self::Logs { entries } => entries.last().map(|e| e.id.to_string()),
            Self::Output { offset, chunk } => Some((offset + chunk.len()).to_string()),
            _ => None,
        }
    }

    fn status(job: &Job) -> Self {
        Self::Status {
            job_id: job.id,
            status: job.status,
            error_message: job.error_message.clone(),
            result_summary: job.result_summary.clone(),
            completed_at: job.completed_at,
        }
    }
}

/// How a stream loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The final status or `execution_finished` event was delivered.
    Completed,
    /// The subscriber went away.
    Disconnected,
    /// An `error` event was delivered.
    Failed,
}

/// Where a stream loop sends its events.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Resolves once the subscriber is gone.
    async fn closed(&self);

    /// `false` when the subscriber is gone.
    async fn send(&self, event: StreamEvent) -> bool;
}

#[async_trait]
impl EventSink for mpsc::Sender<StreamEvent> {
    fn is_connected(&self) -> bool {
        !mpsc::Sender::is_closed(self)
    }

    async fn closed(&self) {
        mpsc::Sender::closed(self).await
    }

    async fn send(&self, event: StreamEvent) -> bool {
        mpsc::Sender::send(self, event).await.is_ok()
    }
}

enum Tick {
    /// Sleep, then tick again.
    Wait,
    /// More is ready; tick again without sleeping.
    Again,
    Done(StreamEnd),
}

#[derive(Clone)]
pub struct LivePublisher {
    jobs: Arc<dyn JobStore>,
    logs: Arc<dyn ProgressLogStore>,
    buffers: Arc<OutputBuffers>,
    executions: Arc<dyn ExecutionStore>,
    config: PublisherConfig,
}

impl LivePublisher {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        logs: Arc<dyn ProgressLogStore>,
        buffers: Arc<OutputBuffers>,
        executions: Arc<dyn ExecutionStore>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            jobs,
            logs,
            buffers,
            executions,
            config,
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Job log stream
    // -----------------------------------------------------------------------

    /// Stream entries of `job_id` after `cursor` until the job is terminal and
    /// drained, then send one `status` event.
    pub async fn stream_job(&self, job_id: DbId, cursor: DbId, sink: &dyn EventSink) -> StreamEnd {
        tracing::debug!(job_id, cursor, "Job log stream opened");
        let mut cursor = cursor;
        let mut failures = 0u32;
        let end = loop {
            if !sink.is_connected() {
                break StreamEnd::Disconnected;
            }
            match self.tick_job(job_id, &mut cursor, sink).await {
                Ok(Tick::Done(end)) => break end,
                Ok(Tick::Again) => {
                    failures = 0;
                    continue;
                }
                Ok(Tick::Wait) => failures = 0,
                Err(e @ CoreError::NotFound { .. }) => {
                    break self.give_up(sink, e.to_string()).await;
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(job_id, failures, error = %e, "Job log stream read failed");
                    if failures > self.config.failure_budget {
                        let message = format!("Giving up after {failures} consecutive read failures: {e}");
                        break self.give_up(sink, message).await;
                    }
                }
            }
            if !self.pause(sink).await {
                break StreamEnd::Disconnected;
            }
        };
        tracing::debug!(job_id, cursor, ?end, "Job log stream closed");
        end
    }

    async fn tick_job(
        &self,
        job_id: DbId,
        cursor: &mut DbId,
        sink: &dyn EventSink,
    ) -> CoreResult<Tick> {
        // Status first: everything written before a terminal status is then
        // visible to the read below.
        let job = self
            .jobs
            .find(job_id)
            .await?
            .ok_or_else(|| CoreError::not_found("job", job_id))?;
        let entries = self.logs.since(job_id, *cursor, self.config.batch_size).await?;
        let drained = (entries.len() as i64) < self.config.batch_size;

        if let Some(last) = entries.last() {
            let last_id = last.id;
            if !sink.send(StreamEvent::Logs { entries }).await {
                return Ok(Tick::Done(StreamEnd::Disconnected));
            }
            *cursor = last_id;
        } else if !job.status.is_terminal() && !sink.send(StreamEvent::Heartbeat).await {
            return Ok(Tick::Done(StreamEnd::Disconnected));
        }

        if !drained {
            return Ok(Tick::Again);
        }
        if job.status.is_terminal() {
            let end = if sink.send(StreamEvent::status(&job)).await {
                StreamEnd::Completed
            } else {
                StreamEnd::Disconnected
            };
            return Ok(Tick::Done(end));
        }
        Ok(Tick::Wait)
    }

    // -----------------------------------------------------------------------
    // Execution output stream
    // -----------------------------------------------------------------------

    /// Tail the output of `correlation_id` from byte `offset`, then send one
    /// `execution_finished` event.
    pub async fn stream_output(
        &self,
        correlation_id: Uuid,
        offset: usize,
        sink: &dyn EventSink,
    ) -> StreamEnd {
        match self.buffers.subscribe(correlation_id) {
            Some(cell) => self.tail_cell(correlation_id, cell, offset, sink).await,
            None => self.replay_record(correlation_id, offset, sink).await,
        }
    }

    async fn tail_cell(
        &self,
        correlation_id: Uuid,
        cell: Arc<BufferCell>,
        mut offset: usize,
        sink: &dyn EventSink,
    ) -> StreamEnd {
        loop {
            if !sink.is_connected() {
                return StreamEnd::Disconnected;
            }
            // Read `closed` before the text: nothing is appended after close.
            let closed = cell.is_closed();
            let (chunk, next) = cell.read_from(offset);
            if !chunk.is_empty() {
                let event = StreamEvent::Output {
                    offset: next - chunk.len(),
                    chunk,
                };
                if !sink.send(event).await {
                    return StreamEnd::Disconnected;
                }
                offset = next;
            } else if !closed && !sink.send(StreamEvent::Heartbeat).await {
                return StreamEnd::Disconnected;
            }

            if closed {
                let success = match cell.outcome() {
                    Some(success) => Some(success),
                    None => self.recorded_success(correlation_id).await,
                };
                return self.finish_output(correlation_id, success, sink).await;
            }
            if !self.pause(sink).await {
                return StreamEnd::Disconnected;
            }
        }
    }

    /// The buffer is already gone: serve the rest from the persisted record.
    async fn replay_record(
        &self,
        correlation_id: Uuid,
        offset: usize,
        sink: &dyn EventSink,
    ) -> StreamEnd {
        let mut failures = 0u32;
        loop {
            if !sink.is_connected() {
                return StreamEnd::Disconnected;
            }
            match self.executions.find(correlation_id).await {
                Ok(Some(record)) => {
                    let stdout = &record.result.stdout;
                    let start = char_floor(stdout, offset);
                    let rest = stdout.get(start..).unwrap_or_default();
                    if !rest.is_empty() {
                        let event = StreamEvent::Output {
                            offset: start,
                            chunk: rest.to_string(),
                        };
                        if !sink.send(event).await {
                            return StreamEnd::Disconnected;
                        }
                    }
                    return self
                        .finish_output(correlation_id, Some(record.result.success), sink)
                        .await;
                }
                Ok(None) => {
                    let err = CoreError::not_found("execution", correlation_id);
                    return self.give_up(sink, err.to_string()).await;
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(%correlation_id, failures, error = %e, "Execution lookup failed");
                    if failures > self.config.failure_budget {
                        let message = format!("Giving up after {failures} consecutive read failures: {e}");
                        return self.give_up(sink, message).await;
                    }
                }
            }
            if !self.pause(sink).await {
                return StreamEnd::Disconnected;
            }
        }
    }

    async fn recorded_success(&self, correlation_id: Uuid) -> Option<bool> {
        match self.executions.find(correlation_id).await {
            Ok(record) => record.map(|r| r.result.success),
            Err(_) => None,
        }
    }

    async fn finish_output(
        &self,
        correlation_id: Uuid,
        success: Option<bool>,
        sink: &dyn EventSink,
    ) -> StreamEnd {
        let event = StreamEvent::ExecutionFinished {
            correlation_id,
            success,
        };
        if sink.send(event).await {
            StreamEnd::Completed
        } else {
            StreamEnd::Disconnected
        }
    }

    // -----------------------------------------------------------------------
    // Shared
    // -----------------------------------------------------------------------

    async fn give_up(&self, sink: &dyn EventSink, message: String) -> StreamEnd {
        tracing::warn!(%message, "Live stream giving up");
        if sink.send(StreamEvent::Error { message }).await {
            StreamEnd::Failed
        } else {
            StreamEnd::Disconnected
        }
    }

    /// Sleep one interval. `false` when the subscriber left meanwhile.
    async fn pause(&self, sink: &dyn EventSink) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.poll_interval) => sink.is_connected(),
            _ = sink.closed() => false,
        }
    }
}
