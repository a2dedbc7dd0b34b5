use std::collections::BTreeMap;
use std::ops::RangeBounds;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::{MergeOperator, Storage};
use crate::{BytesRange, Record, StorageError, StorageIterator, StorageRead, StorageResult};

/// In-memory implementation of the Storage trait using a BTreeMap.
///
/// Used by tests and by the `InMemory` storage configuration. Nothing is
/// persisted; `flush` and `close` are no-ops.
pub struct InMemoryStorage {
    data: Arc<RwLock<BTreeMap<Bytes, Bytes>>>,
    merge_operator: Option<Arc<dyn MergeOperator>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            merge_operator: None,
        }
    }

    /// Creates a store whose `merge` calls go through `merge_operator`.
    pub fn with_merge_operator(merge_operator: Arc<dyn MergeOperator>) -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            merge_operator: Some(merge_operator),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageRead for InMemoryStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(data.get(&key).map(|v| Record::new(key, v.clone())))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn scan_iter(
        &self,
        range: BytesRange,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;

        let records: Vec<Record> = data
            .range((range.start_bound().cloned(), range.end_bound().cloned()))
            .map(|(k, v)| Record::new(k.clone(), v.clone()))
            .collect();

        Ok(Box::new(InMemoryIterator {
            records: records.into_iter(),
        }))
    }
}

struct InMemoryIterator {
    records: std::vec::IntoIter<Record>,
}

#[async_trait]
impl StorageIterator for InMemoryIterator {
    async fn next(&mut self) -> StorageResult<Option<Record>> {
        Ok(self.records.next())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put(&self, records: Vec<Record>) -> StorageResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        for record in records {
            data.insert(record.key, record.value);
        }
        Ok(())
    }

    async fn merge(&self, records: Vec<Record>) -> StorageResult<()> {
        let Some(op) = self.merge_operator.as_ref() else {
            return Err(StorageError::Storage(
                "Merge operator not configured for this database".to_string(),
            ));
        };
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        for record in records {
            let existing = data.get(&record.key).cloned();
            let merged = op.merge(&record.key, existing, record.value);
            data.insert(record.key, merged);
        }
        Ok(())
    }

    async fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Appends the new value after the existing one.
    struct ConcatMerge;

    impl MergeOperator for ConcatMerge {
        fn merge(&self, _key: &Bytes, existing: Option<Bytes>, new_value: Bytes) -> Bytes {
            let mut out = existing.map(|b| b.to_vec()).unwrap_or_default();
            out.extend_from_slice(&new_value);
            Bytes::from(out)
        }
    }

    fn record(key: &str, value: &str) -> Record {
        Record::new(Bytes::from(key.to_string()), Bytes::from(value.to_string()))
    }

    #[tokio::test]
    async fn should_put_and_get_record() {
        // given
        let storage = InMemoryStorage::new();

        // when
        storage.put(vec![record("k1", "v1")]).await.unwrap();

        // then
        let got = storage.get(Bytes::from("k1")).await.unwrap();
        assert_eq!(got, Some(record("k1", "v1")));
        assert_eq!(storage.get(Bytes::from("k2")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_scan_range_in_key_order() {
        // given
        let storage = InMemoryStorage::new();
        storage
            .put(vec![record("c", "3"), record("a", "1"), record("b", "2")])
            .await
            .unwrap();

        // when
        let records = storage
            .scan(BytesRange::inclusive(Bytes::from("a"), Bytes::from("b")))
            .await
            .unwrap();

        // then
        assert_eq!(records, vec![record("a", "1"), record("b", "2")]);
    }

    #[tokio::test]
    async fn should_merge_with_configured_operator() {
        // given
        let storage = InMemoryStorage::with_merge_operator(Arc::new(ConcatMerge));

        // when
        storage.merge(vec![record("k", "ab")]).await.unwrap();
        storage.merge(vec![record("k", "cd")]).await.unwrap();

        // then
        let got = storage.get(Bytes::from("k")).await.unwrap().unwrap();
        assert_eq!(got.value, Bytes::from("abcd"));
    }

    #[tokio::test]
    async fn should_reject_merge_without_operator() {
        // given
        let storage = InMemoryStorage::new();

        // when
        let result = storage.merge(vec![record("k", "v")]).await;

        // then
        assert!(matches!(result, Err(StorageError::Storage(_))));
    }
}
