use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::signal;

use super::handlers::{
    AppState, handle_healthy, handle_inspect, handle_metrics, handle_ping, handle_render,
    handle_write,
};
use super::middleware::{MetricsLayer, TracingLayer};

/// Build the router with every route and middleware, without binding a port.
pub fn build_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    Router::new()
        .route("/ping", get(handle_ping))
        .route("/inspect", get(handle_inspect))
        .route("/render", get(handle_render).post(handle_render))
        .route("/datapoints", post(handle_write))
        .route("/metrics", get(handle_metrics))
        .route("/-/healthy", get(handle_healthy))
        .layer(TracingLayer::new())
        .layer(MetricsLayer::new(metrics))
        .with_state(state)
}

/// Graphite-compatible HTTP server.
pub struct GraphiteServer {
    state: AppState,
    storage: Arc<dyn common::Storage>,
    port: u16,
}

impl GraphiteServer {
    pub fn new(state: AppState, storage: Arc<dyn common::Storage>, port: u16) -> Self {
        Self {
            state,
            storage,
            port,
        }
    }

    /// Serves until SIGINT or SIGTERM, then flushes and closes storage.
    pub async fn run(self) -> std::io::Result<()> {
        let app = build_router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Starting graphite server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Flushing storage before shutdown...");
        if let Err(e) = self.storage.flush().await {
            tracing::error!("Failed to flush storage on shutdown: {}", e);
        }
        if let Err(e) = self.storage.close().await {
            tracing::error!("Failed to close storage: {}", e);
        }

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Listen for SIGTERM and SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
