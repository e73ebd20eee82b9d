use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snipgate_api::config::ServerConfig;
use snipgate_api::router::build_app_router;
use snipgate_api::seed::seed_ping_artifact;
use snipgate_api::state::{AppState, Stores};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "snipgate_api=debug,snipgate_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Storage ---
    let (stores, pool) = match &config.database_url {
        Some(database_url) => {
            let pool = snipgate_db::create_pool(database_url, config.db_max_connections)
                .await
                .expect("Failed to connect to database");
            tracing::info!(max_connections = config.db_max_connections, "Database connection pool created");

            snipgate_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database health check passed");

            snipgate_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            (
                Stores::postgres(pool.clone(), config.request_log_capacity),
                Some(pool),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            (Stores::memory(config.request_log_capacity), None)
        }
    };

    // --- App state ---
    let state = AppState::new(config.clone(), stores, pool).expect("Invalid runtime configuration");

    let recovered = state
        .runtime
        .supervisor()
        .recover_orphans()
        .await
        .expect("Failed to recover orphaned jobs");
    tracing::info!(recovered, "Orphaned job recovery complete");

    seed_ping_artifact(state.stores.artifacts.as_ref())
        .await
        .expect("Failed to seed the ping artifact");

    // --- Router ---
    let app = build_app_router(state.clone(), &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let shutdown = state.shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        // Open SSE streams would otherwise hold the drain open.
        shutdown.cancel();
    })
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    state.runtime.close();
    let budget = Duration::from_secs(config.shutdown_timeout_secs);
    if state.runtime.supervisor().shutdown(budget).await {
        tracing::info!("All job units drained");
    } else {
        tracing::warn!(budget_secs = config.shutdown_timeout_secs, "Gave up waiting for job units");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
