use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use oilcast_api::config::ServerConfig;
use oilcast_api::router::build_app_router;
use oilcast_api::state::AppState;
use oilcast_core::job::JobStatus;
use oilcast_trainer::DenseTrainer;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oilcast_api=debug,oilcast_trainer=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        model_dir = %config.model_dir.display(),
        default_dataset = %config.default_dataset_path.display(),
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Loaded server configuration",
    );

    // --- App state ---
    let trainer = Arc::new(DenseTrainer::new(config.train.clone()));
    let state = AppState::new(config.clone(), trainer);
    let registry = Arc::clone(&state.registry);
    let publisher = Arc::clone(&state.publisher);

    // --- Router ---
    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    // Open progress streams hold connections, so draining is time-boxed.
    tokio::select! {
        result = &mut server => {
            result.expect("Server task panicked").expect("Server error");
        }
        () = shutdown_signal() => {
            shutdown.cancel();
            let drain = Duration::from_secs(config.shutdown_timeout_secs);
            if tokio::time::timeout(drain, &mut server).await.is_err() {
                tracing::warn!(
                    timeout_secs = config.shutdown_timeout_secs,
                    "Graceful shutdown timed out, closing remaining connections",
                );
                server.abort();
            }
        }
    }

    // --- Post-shutdown ---
    let running = registry.count_by_status(JobStatus::Running).await;
    let pending = registry.count_by_status(JobStatus::Pending).await;
    tracing::info!(
        running,
        pending,
        open_streams = publisher.total_observers(),
        "Server stopped; unfinished jobs are abandoned",
    );

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
