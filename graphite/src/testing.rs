//! Helpers for integration tests that drive the HTTP router with
//! `oneshot()` over in-memory storage.

use std::sync::Arc;

use axum::Router;
use common::{MockClock, StorageConfig, create_storage};

use crate::config::Config;
use crate::error::Result;
use crate::query::Evaluator;
use crate::server::{AppState, Metrics, build_router};
use crate::storage::{self, BackendStore, KvBackend, PointsMergeOperator};

/// A router plus handles on the pieces tests poke at directly.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<BackendStore>,
    pub clock: Arc<MockClock>,
}

/// Build the production router over in-memory storage with the clock
/// pinned at `now_secs`.
pub async fn build_app(now_secs: u64) -> Result<TestApp> {
    let config = Config {
        storage: StorageConfig::InMemory,
        ..Config::default()
    };
    let storage = create_storage(&config.storage, Some(Arc::new(PointsMergeOperator)))
        .await
        .map_err(storage::Error::from)?;

    let backend = Arc::new(KvBackend::new(storage));
    let store = Arc::new(BackendStore::new(backend, config.fetch_config()));
    let clock = Arc::new(MockClock::at_secs(now_secs));

    let state = AppState {
        evaluator: Evaluator::new(store.clone()),
        metrics: Arc::new(Metrics::new()),
        config: Arc::new(config),
        clock: clock.clone(),
    };

    Ok(TestApp {
        router: build_router(state),
        store,
        clock,
    })
}
