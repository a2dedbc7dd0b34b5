use std::sync::Arc;

use clap::Parser;
use common::{SystemClock, create_storage};

use graphite::server::{AppState, GraphiteServer, Metrics};
use graphite::{
    BackendStore, CliArgs, Config, Evaluator, KvBackend, PointsMergeOperator, load_config,
};

#[tokio::main]
async fn main() {
    // Log level comes from RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_target(true)
        .with_line_number(true)
        .init();

    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::info!("No configuration file provided, using defaults");
            Config::default()
        }
    };

    tracing::info!("Creating storage with config: {:?}", config.storage);
    let storage = create_storage(&config.storage, Some(Arc::new(PointsMergeOperator)))
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to create storage: {}", e);
            std::process::exit(1);
        });

    let backend = Arc::new(KvBackend::new(storage.clone()));
    let store = Arc::new(BackendStore::new(backend, config.fetch_config()));
    let state = AppState {
        evaluator: Evaluator::new(store),
        metrics: Arc::new(Metrics::new()),
        config: Arc::new(config),
        clock: Arc::new(SystemClock),
    };

    let server = GraphiteServer::new(state, storage, args.port);
    if let Err(e) = server.run().await {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}
