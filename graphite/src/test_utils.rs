//! In-memory doubles for the backend and store capabilities.
//!
//! Both count how many calls started and finished so tests can assert that
//! no fetch task is still running once a fan-out returns.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::model::{Metric, Series};
use crate::storage::{self, Backend, Store};

type Tables = HashMap<String, BTreeMap<(i64, String), Bytes>>;

/// Backend double with per-partition delays and failures.
///
/// Failing partitions answer immediately; every other call sleeps for its
/// delay first, so failures are observed while siblings are still running.
#[derive(Default)]
pub(crate) struct FakeBackend {
    tables: Mutex<Tables>,
    default_delay: Duration,
    delays: HashMap<(String, i64), Duration>,
    failures: HashMap<(String, i64), storage::Error>,
    ping_failure: Option<storage::Error>,
    puts: Mutex<Vec<(String, i64, String, Vec<(i64, f64)>)>>,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub(crate) fn with_delay(mut self, table: &str, item_epoch: i64, delay: Duration) -> Self {
        self.delays.insert((table.to_string(), item_epoch), delay);
        self
    }

    pub(crate) fn with_failure(
        mut self,
        table: &str,
        item_epoch: i64,
        err: storage::Error,
    ) -> Self {
        self.failures.insert((table.to_string(), item_epoch), err);
        self
    }

    pub(crate) fn with_ping_failure(mut self, err: storage::Error) -> Self {
        self.ping_failure = Some(err);
        self
    }

    /// Stores an item, creating its table if needed.
    pub(crate) fn insert(&self, table: &str, item_epoch: i64, name: &str, value: Bytes) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert((item_epoch, name.to_string()), value);
    }

    pub(crate) fn puts(&self) -> Vec<(String, i64, String, Vec<(i64, f64)>)> {
        self.puts.lock().unwrap().clone()
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    fn lookup(
        &self,
        table: &str,
        item_epoch: i64,
        names: &[String],
    ) -> storage::Result<Vec<(String, Bytes)>> {
        let key = (table.to_string(), item_epoch);
        if let Some(err) = self.failures.get(&key) {
            return Err(err.clone());
        }
        let tables = self.tables.lock().unwrap();
        let Some(items) = tables.get(table) else {
            return Err(storage::Error::NotFound(format!("table {}", table)));
        };
        Ok(names
            .iter()
            .filter_map(|name| {
                items
                    .get(&(item_epoch, name.clone()))
                    .map(|v| (name.clone(), v.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn ping(&self) -> storage::Result<()> {
        match &self.ping_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn create_table(&self, table: &str) -> storage::Result<()> {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default();
        Ok(())
    }

    async fn batch_get(
        &self,
        table: &str,
        item_epoch: i64,
        names: &[String],
    ) -> storage::Result<Vec<(String, Bytes)>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let key = (table.to_string(), item_epoch);
        if !self.failures.contains_key(&key) {
            let delay = self.delays.get(&key).copied().unwrap_or(self.default_delay);
            tokio::time::sleep(delay).await;
        }
        let result = self.lookup(table, item_epoch, names);
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn put(
        &self,
        table: &str,
        item_epoch: i64,
        name: &str,
        points: &[(i64, f64)],
    ) -> storage::Result<()> {
        if !self.tables.lock().unwrap().contains_key(table) {
            return Err(storage::Error::NotFound(format!("table {}", table)));
        }
        self.puts.lock().unwrap().push((
            table.to_string(),
            item_epoch,
            name.to_string(),
            points.to_vec(),
        ));
        Ok(())
    }
}

type FetchFn = dyn Fn(&str, i64, i64) -> Result<Vec<Series>> + Send + Sync;

/// Store double answering fetches from a closure.
///
/// Successful fetches sleep for the configured delay; failing ones return
/// at once.
pub(crate) struct FakeStore {
    fetch: Box<FetchFn>,
    delay: Duration,
    ping_result: Result<()>,
    calls: Mutex<Vec<String>>,
    inserted: Mutex<Vec<Metric>>,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl FakeStore {
    pub(crate) fn new<F>(fetch: F) -> Self
    where
        F: Fn(&str, i64, i64) -> Result<Vec<Series>> + Send + Sync + 'static,
    {
        Self {
            fetch: Box::new(fetch),
            delay: Duration::ZERO,
            ping_result: Ok(()),
            calls: Mutex::new(Vec::new()),
            inserted: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    /// A store where every name resolves to one single-point series.
    pub(crate) fn echo() -> Self {
        Self::new(|name, _, _| Ok(vec![Series::new(name, vec![10.0], 1, 60)]))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_ping_result(mut self, result: Result<()>) -> Self {
        self.ping_result = result;
        self
    }

    /// Patterns passed to `fetch`, in call order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn inserted(&self) -> Vec<Metric> {
        self.inserted.lock().unwrap().clone()
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn fetch(&self, pattern: &str, start: i64, end: i64) -> Result<Vec<Series>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(pattern.to_string());
        let result = (self.fetch)(pattern, start, end);
        if result.is_ok() {
            tokio::time::sleep(self.delay).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn ping(&self) -> Result<()> {
        self.ping_result.clone()
    }

    async fn insert_metric(&self, metric: &Metric) -> Result<()> {
        self.inserted.lock().unwrap().push(metric.clone());
        Ok(())
    }
}
