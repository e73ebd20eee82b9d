use std::sync::Arc;

use snipgate_core::error::CoreResult;
use snipgate_core::memory::MemoryStore;
use snipgate_core::output::OutputBuffers;
use snipgate_core::publisher::LivePublisher;
use snipgate_core::runtime::Runtime;
use snipgate_core::store::{
    ArtifactStore, ExecutionStore, JobStore, ProgressLogStore, RequestLogStore,
};
use snipgate_db::{DbPool, PgStore};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// The persistence seams, one handle per concern.
#[derive(Clone)]
pub struct Stores {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub jobs: Arc<dyn JobStore>,
    pub logs: Arc<dyn ProgressLogStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub request_logs: Arc<dyn RequestLogStore>,
}

impl Stores {
    /// Serve every concern from one backing store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ArtifactStore + JobStore + ProgressLogStore + ExecutionStore + RequestLogStore + 'static,
    {
        Self {
            artifacts: store.clone(),
            jobs: store.clone(),
            logs: store.clone(),
            executions: store.clone(),
            request_logs: store,
        }
    }

    pub fn memory(request_log_capacity: usize) -> Self {
        Self::shared(Arc::new(MemoryStore::with_request_log_capacity(
            request_log_capacity,
        )))
    }

    pub fn postgres(pool: DbPool, request_log_capacity: usize) -> Self {
        Self::shared(Arc::new(PgStore::with_request_log_capacity(
            pool,
            request_log_capacity,
        )))
    }
}

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything inside is behind `Arc` or is already a handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub stores: Stores,
    pub runtime: Runtime,
    pub publisher: LivePublisher,
    /// Present when running against Postgres; probed by `/health`.
    pub pool: Option<DbPool>,
    /// Cancelled when the server starts shutting down; ends open streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig, stores: Stores, pool: Option<DbPool>) -> CoreResult<Self> {
        let buffers = Arc::new(OutputBuffers::new());
        let runtime = Runtime::new(
            config.runtime_config()?,
            Arc::clone(&stores.jobs),
            Arc::clone(&stores.logs),
            Arc::clone(&stores.executions),
            Arc::clone(&buffers),
        );
        let publisher = LivePublisher::new(
            Arc::clone(&stores.jobs),
            Arc::clone(&stores.logs),
            buffers,
            Arc::clone(&stores.executions),
            config.publisher_config(),
        );
        Ok(Self {
            config: Arc::new(config),
            stores,
            runtime,
            publisher,
            pool,
            shutdown: CancellationToken::new(),
        })
    }

    /// Human-readable storage backend name.
    pub fn storage_kind(&self) -> &'static str {
        if self.pool.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }
}
