//! Batched, concurrent retrieval of point sets across partitions.

use std::sync::Arc;

use crate::config::FetchConfig;
use crate::fanout::join_all;
use crate::model::{DataPoint, SeriesMap, SeriesPoints};
use crate::names::{group_names, split_name};
use crate::partition::{self, Partition};

use super::codec::decode_points;
use super::{Backend, Error, Result};

/// The work of one fetch task: one batched read of one partition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueryUnit {
    pub names: Vec<String>,
    pub start: i64,
    pub end: i64,
    pub partition: Partition,
    pub step: i64,
}

pub(crate) struct FetchEngine {
    backend: Arc<dyn Backend>,
    config: FetchConfig,
}

impl FetchEngine {
    pub(crate) fn new(backend: Arc<dyn Backend>, config: FetchConfig) -> Self {
        Self { backend, config }
    }

    /// Builds one unit per (partition, name batch) pair, partitions outermost.
    pub(crate) fn plan(
        &self,
        names: &[String],
        start: i64,
        end: i64,
    ) -> Result<(Vec<QueryUnit>, i64)> {
        let (partitions, step) = partition::select(start, end, &self.config.table_prefix)?;
        let batches = group_names(names, self.config.batch_limit);

        let mut units = Vec::with_capacity(partitions.len() * batches.len());
        for partition in &partitions {
            for batch in &batches {
                units.push(QueryUnit {
                    names: batch.clone(),
                    start,
                    end,
                    partition: partition.clone(),
                    step,
                });
            }
        }
        Ok((units, step))
    }

    /// Fetches every name matched by `pattern` over `[start, end]`.
    ///
    /// Every expanded name has an entry in the result, empty when nothing
    /// was stored. Partial results are merged in plan order, so when two
    /// partitions hold the same timestamp the later partition wins.
    pub(crate) async fn fetch(&self, pattern: &str, start: i64, end: i64) -> Result<SeriesMap> {
        let names = split_name(pattern);
        let (units, step) = self.plan(&names, start, end)?;
        tracing::debug!(
            pattern,
            start,
            end,
            names = names.len(),
            units = units.len(),
            step,
            "fetching points"
        );

        let tasks = units.into_iter().map(|unit| {
            let backend = self.backend.clone();
            async move { run_unit(backend.as_ref(), unit).await }
        });
        let partials = join_all(tasks).await?;

        let mut merged: SeriesMap = names
            .iter()
            .map(|name| SeriesPoints::new(name.as_str(), step))
            .collect();
        for partial in partials {
            merged.merge(partial)?;
        }
        Ok(merged)
    }
}

async fn run_unit(backend: &dyn Backend, unit: QueryUnit) -> Result<SeriesMap> {
    let Partition { table, item_epoch } = &unit.partition;
    let items = match backend.batch_get(table, *item_epoch, &unit.names).await {
        Ok(items) => items,
        Err(Error::NotFound(msg)) => {
            tracing::debug!(table = %table, item_epoch, "{}, treating as empty", msg);
            return Ok(SeriesMap::new());
        }
        Err(e) => return Err(e),
    };

    let mut partial = SeriesMap::new();
    for (name, value) in items {
        let points = decode_points(&value)?
            .into_iter()
            .filter(|&(ts, _)| unit.start <= ts && ts <= unit.end)
            .map(|(ts, v)| DataPoint::new(ts, v));
        partial.insert(SeriesPoints::from_points(name, points, unit.step));
    }
    Ok(partial)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::storage::codec::encode_points;
    use crate::test_utils::FakeBackend;

    fn config(batch_limit: usize) -> FetchConfig {
        FetchConfig {
            table_prefix: "tbl".to_string(),
            batch_limit,
        }
    }

    fn points_of(map: &SeriesMap, name: &str) -> Vec<DataPoint> {
        map.get(name).unwrap().points().collect()
    }

    #[test]
    fn should_plan_partitions_times_batches() {
        // given
        let engine = FetchEngine::new(Arc::new(FakeBackend::new()), config(2));
        let names = split_name("n{1,2,3,4,5}");

        // when
        let (units, step) = engine.plan(&names, 100, 6000).unwrap();

        // then
        assert_eq!(step, 60);
        assert_eq!(units.len(), 6);
        assert_eq!(units[0].partition, Partition::new("tbl-1m1h-0", 0));
        assert_eq!(units[0].names, vec!["n1", "n2"]);
        assert_eq!(units[2].names, vec!["n5"]);
        assert_eq!(units[3].partition, Partition::new("tbl-1m1h-0", 3600));
    }

    #[tokio::test]
    async fn should_merge_partitions_and_filter_window() {
        // given
        let backend = FakeBackend::new();
        backend.insert("tbl-1m1h-0", 0, "m", encode_points(&[(60, 1.0), (120, 2.0)]));
        backend.insert(
            "tbl-1m1h-0",
            3600,
            "m",
            encode_points(&[(3600, 3.0), (7000, 9.0)]),
        );
        let engine = FetchEngine::new(Arc::new(backend), config(100));

        // when
        let map = engine.fetch("m", 100, 6000).await.unwrap();

        // then
        assert_eq!(
            points_of(&map, "m"),
            vec![DataPoint::new(120, 2.0), DataPoint::new(3600, 3.0)]
        );
    }

    #[tokio::test]
    async fn should_let_later_partition_win_on_duplicate_timestamp() {
        // given
        // the later partition completes first
        let backend = FakeBackend::new()
            .with_default_delay(Duration::from_millis(20))
            .with_delay("tbl-1m1h-0", 3600, Duration::ZERO);
        backend.insert("tbl-1m1h-0", 0, "m", encode_points(&[(3600, 1.0)]));
        backend.insert("tbl-1m1h-0", 3600, "m", encode_points(&[(3600, 2.0)]));
        let engine = FetchEngine::new(Arc::new(backend), config(100));

        // when
        let map = engine.fetch("m", 100, 6000).await.unwrap();

        // then
        assert_eq!(points_of(&map, "m"), vec![DataPoint::new(3600, 2.0)]);
    }

    #[tokio::test]
    async fn should_treat_missing_table_as_empty_series() {
        // given
        let engine = FetchEngine::new(Arc::new(FakeBackend::new()), config(100));

        // when
        let map = engine.fetch("server{1,2}.cpu", 100, 6000).await.unwrap();

        // then
        assert_eq!(map.len(), 2);
        assert!(map.iter().all(|points| points.is_empty() && points.step() == 60));
    }

    #[tokio::test]
    async fn should_fail_and_drain_when_one_unit_errors() {
        // given
        let backend = Arc::new(
            FakeBackend::new()
                .with_default_delay(Duration::from_millis(20))
                .with_failure("tbl-1m1h-0", 3600, Error::Storage("throttled".to_string())),
        );
        let engine = FetchEngine::new(backend.clone(), config(1));

        // when
        let result = engine.fetch("a,b,c", 100, 6000).await;

        // then
        assert_eq!(result, Err(Error::Storage("throttled".to_string())));
        assert_eq!(backend.started(), 6);
        assert_eq!(backend.finished(), 6);
    }

    #[tokio::test]
    async fn should_not_leak_tasks_on_success() {
        // given
        let backend = Arc::new(FakeBackend::new().with_default_delay(Duration::from_millis(5)));
        backend.insert("tbl-1m1h-0", 0, "a", Bytes::new());
        let engine = FetchEngine::new(backend.clone(), config(2));

        // when
        engine.fetch("a,b,c", 100, 6000).await.unwrap();

        // then
        assert_eq!(backend.started(), 4);
        assert_eq!(backend.finished(), 4);
    }

    #[tokio::test]
    async fn should_reject_corrupt_point_encoding() {
        // given
        let backend = FakeBackend::new();
        backend.insert("tbl-1m1h-0", 0, "m", Bytes::from_static(&[0u8; 5]));
        let engine = FetchEngine::new(Arc::new(backend), config(100));

        // when
        let result = engine.fetch("m", 100, 600).await;

        // then
        assert!(matches!(result, Err(Error::Encoding(_))));
    }

    #[tokio::test]
    async fn should_reject_unbounded_window_before_touching_backend() {
        // given
        let backend = Arc::new(FakeBackend::new());
        let engine = FetchEngine::new(backend.clone(), config(100));

        // when
        let result = engine.fetch("m", i64::MIN, i64::MAX).await;

        // then
        assert!(matches!(result, Err(Error::InvalidRange(_))));
        assert_eq!(backend.started(), 0);
    }
}
