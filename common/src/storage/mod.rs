pub mod config;
pub mod factory;
pub mod in_memory;
pub mod slate;

use async_trait::async_trait;
use bytes::Bytes;

use crate::BytesRange;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }

    pub fn empty(key: Bytes) -> Self {
        Self::new(key, Bytes::new())
    }
}

/// Error type for storage operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Failures reported by the underlying engine
    Storage(String),
    /// Internal errors
    Internal(String),
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StorageError {
    /// Converts an engine error to StorageError::Storage.
    pub fn from_storage(e: impl std::fmt::Display) -> Self {
        StorageError::Storage(e.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Combines an existing value with a newly merged one.
///
/// Implementations must be associative so that the engine may fold pending
/// merges in any grouping: `merge(merge(a, b), c) == merge(a, merge(b, c))`.
pub trait MergeOperator: Send + Sync {
    fn merge(&self, key: &Bytes, existing_value: Option<Bytes>, new_value: Bytes) -> Bytes;
}

#[async_trait]
pub trait StorageIterator {
    async fn next(&mut self) -> StorageResult<Option<Record>>;
}

/// Read side of the storage layer.
///
/// Implementations are shared across concurrently running fetch tasks, so
/// every method takes `&self` and must be safe to call in parallel.
#[async_trait]
pub trait StorageRead: Send + Sync {
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>>;

    /// Returns an owned iterator over records in `range`, in key order.
    async fn scan_iter(
        &self,
        range: BytesRange,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>>;

    /// Collects all records in the range into a Vec.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn scan(&self, range: BytesRange) -> StorageResult<Vec<Record>> {
        let mut iter = self.scan_iter(range).await?;
        let mut records = Vec::new();
        while let Some(record) = iter.next().await? {
            records.push(record);
        }
        Ok(records)
    }
}

/// The storage type encapsulates access to the underlying engine (in-memory or SlateDB).
#[async_trait]
pub trait Storage: StorageRead {
    /// Writes all records in one atomic batch.
    async fn put(&self, records: Vec<Record>) -> StorageResult<()>;

    /// Merges values into existing keys using the configured merge operator.
    ///
    /// Fails with [`StorageError::Storage`] when the engine was built without
    /// a merge operator.
    async fn merge(&self, records: Vec<Record>) -> StorageResult<()>;

    /// Flushes acknowledged writes to durable storage.
    async fn flush(&self) -> StorageResult<()>;

    /// Releases the engine. No further calls are valid afterwards.
    async fn close(&self) -> StorageResult<()>;
}
