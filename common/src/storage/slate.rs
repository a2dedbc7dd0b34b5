use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use slatedb::{
    Db, DbIterator, MergeOperator as SlateDbMergeOperator, MergeOperatorError, WriteBatch,
};

use super::{MergeOperator, Storage};
use crate::{BytesRange, Record, StorageError, StorageIterator, StorageRead, StorageResult};

/// Bridges our [`MergeOperator`] onto SlateDB's merge operator trait.
pub(crate) struct SlateDbMergeOperatorAdapter {
    operator: Arc<dyn MergeOperator>,
}

impl SlateDbMergeOperator for SlateDbMergeOperatorAdapter {
    fn merge(
        &self,
        key: &Bytes,
        existing_value: Option<Bytes>,
        value: Bytes,
    ) -> Result<Bytes, MergeOperatorError> {
        Ok(self.operator.merge(key, existing_value, value))
    }
}

/// SlateDB-backed implementation of the Storage trait.
///
/// SlateDB is an embedded LSM key-value store that persists to object
/// storage, which lets the service run against S3 or a local directory.
pub struct SlateDbStorage {
    db: Arc<Db>,
}

impl SlateDbStorage {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub(crate) fn merge_operator_adapter(
        operator: Arc<dyn MergeOperator>,
    ) -> SlateDbMergeOperatorAdapter {
        SlateDbMergeOperatorAdapter { operator }
    }
}

#[async_trait]
impl StorageRead for SlateDbStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>> {
        let value = self
            .db
            .get(&key)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(value.map(|v| Record::new(key, v)))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn scan_iter(
        &self,
        range: BytesRange,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>> {
        let iter = self
            .db
            .scan(range)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(Box::new(SlateDbIterator { iter }))
    }
}

struct SlateDbIterator {
    iter: DbIterator,
}

#[async_trait]
impl StorageIterator for SlateDbIterator {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn next(&mut self) -> StorageResult<Option<Record>> {
        let entry = self.iter.next().await.map_err(StorageError::from_storage)?;
        Ok(entry.map(|kv| Record::new(kv.key, kv.value)))
    }
}

#[async_trait]
impl Storage for SlateDbStorage {
    async fn put(&self, records: Vec<Record>) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        for record in records {
            batch.put(record.key, record.value);
        }
        self.db
            .write(batch)
            .await
            .map_err(StorageError::from_storage)
    }

    async fn merge(&self, records: Vec<Record>) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        for record in records {
            batch.merge(record.key, record.value);
        }
        self.db.write(batch).await.map_err(|e| {
            let msg = e.to_string();
            if msg.contains("merge operator") || msg.contains("not configured") {
                StorageError::Storage("Merge operator not configured for this database".to_string())
            } else {
                StorageError::from_storage(e)
            }
        })
    }

    async fn flush(&self) -> StorageResult<()> {
        self.db.flush().await.map_err(StorageError::from_storage)
    }

    async fn close(&self) -> StorageResult<()> {
        self.db.close().await.map_err(StorageError::from_storage)
    }
}
