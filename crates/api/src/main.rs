use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cronhub_api::config::ServerConfig;
use cronhub_api::router::build_app_router;
use cronhub_api::state::AppState;
use cronhub_api::ws;
use cronhub_db::store::memory::MemoryCredentialStore;
use cronhub_db::Stores;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cronhub_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        frame_delimiter = ?config.protocol.frame_delimiter,
        "Loaded server configuration",
    );

    // --- Stores ---
    let stores = match &config.database_url {
        Some(database_url) => {
            let pool = cronhub_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            cronhub_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            cronhub_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Stores::postgres(pool)
        }
        None => {
            tracing::warn!(
                worker_keys = config.worker_api_keys.len(),
                "DATABASE_URL not set; using in-memory stores (single instance, nothing persists)",
            );
            let credentials = MemoryCredentialStore::with_keys(&config.worker_api_keys);
            Stores::in_memory(Arc::new(credentials))
        }
    };

    // --- Sessions + heartbeat ---
    let sessions = Arc::new(ws::SessionRegistry::new());
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&sessions),
        config.protocol.heartbeat_interval,
    );

    // --- App state + router ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let state = AppState::new(stores, config, Arc::clone(&sessions));
    let app = build_app_router(state);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let shutdown = CancellationToken::new();
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    });
    let server_handle = tokio::spawn(async move { server.await });

    shutdown_signal().await;

    // Dispatch connections never finish on their own; close them so the
    // server can drain.
    let ws_count = sessions.count().await;
    tracing::info!(ws_count, "Closing worker sessions");
    sessions.shutdown_all().await;
    shutdown.cancel();

    match tokio::time::timeout(shutdown_timeout, server_handle).await {
        Ok(Ok(result)) => result.expect("Server error"),
        Ok(Err(e)) => tracing::error!(error = %e, "Server task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Shutdown timed out with connections still open",
        ),
    }

    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or (on Unix) SIGTERM.
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
