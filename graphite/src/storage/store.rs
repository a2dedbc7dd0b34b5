//! The storage capability consumed by the evaluator and the HTTP layer.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::model::{Metric, Series, SeriesMap};
use crate::partition::{Tier, floor_to};

use super::Backend;
use super::fetch::FetchEngine;

/// Read and write access to stored series.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches the series matched by `pattern` over `[start, end]`, ordered
    /// by metric name. A comma-joined pattern is fetched as one group.
    async fn fetch(&self, pattern: &str, start: i64, end: i64) -> Result<Vec<Series>>;

    async fn ping(&self) -> Result<()>;

    async fn insert_metric(&self, metric: &Metric) -> Result<()>;
}

/// [`Store`] over a partitioned [`Backend`].
pub struct BackendStore {
    backend: Arc<dyn Backend>,
    engine: FetchEngine,
    table_prefix: String,
}

impl BackendStore {
    pub fn new(backend: Arc<dyn Backend>, config: FetchConfig) -> Self {
        Self {
            table_prefix: config.table_prefix.clone(),
            engine: FetchEngine::new(backend.clone(), config),
            backend,
        }
    }

    /// Like [`Store::fetch`] but returns the raw point sets.
    pub async fn fetch_map(&self, pattern: &str, start: i64, end: i64) -> Result<SeriesMap> {
        Ok(self.engine.fetch(pattern, start, end).await?)
    }
}

#[async_trait]
impl Store for BackendStore {
    async fn fetch(&self, pattern: &str, start: i64, end: i64) -> Result<Vec<Series>> {
        Ok(self.fetch_map(pattern, start, end).await?.into_series(start))
    }

    async fn ping(&self) -> Result<()> {
        Ok(self.backend.ping().await?)
    }

    /// Writes every sample into every tier, rounded down to the tier step.
    async fn insert_metric(&self, metric: &Metric) -> Result<()> {
        if metric.name.is_empty() {
            return Err(Error::Argument("metric name must not be empty".to_string()));
        }

        let mut created = HashSet::new();
        for tier in Tier::ALL {
            let mut items: BTreeMap<(i64, i64), Vec<(i64, f64)>> = BTreeMap::new();
            for sample in &metric.datapoints {
                let ts = floor_to(sample.timestamp, tier.step());
                items
                    .entry((tier.table_epoch(ts), tier.item_epoch(ts)))
                    .or_default()
                    .push((ts, sample.value));
            }

            for ((table_epoch, item_epoch), points) in items {
                let table = tier.table_name(&self.table_prefix, table_epoch);
                if created.insert(table.clone()) {
                    self.backend.create_table(&table).await?;
                }
                self.backend
                    .put(&table, item_epoch, &metric.name, &points)
                    .await?;
            }
        }

        tracing::debug!(
            metric = %metric.name,
            samples = metric.datapoints.len(),
            "inserted metric"
        );
        Ok(())
    }
}
