//! Builds a [`Storage`] from a [`StorageConfig`].

use std::sync::Arc;

use slatedb::DbBuilder;
use slatedb::config::Settings;
use slatedb::object_store::{self, ObjectStore};

use super::config::{ObjectStoreConfig, SlateDbStorageConfig, StorageConfig};
use super::in_memory::InMemoryStorage;
use super::slate::SlateDbStorage;
use super::{MergeOperator, Storage, StorageError, StorageResult};

fn create_object_store(config: &ObjectStoreConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        ObjectStoreConfig::InMemory => Ok(Arc::new(object_store::memory::InMemory::new())),
        ObjectStoreConfig::Aws(aws) => {
            let store = object_store::aws::AmazonS3Builder::from_env()
                .with_region(&aws.region)
                .with_bucket_name(&aws.bucket)
                .build()
                .map_err(|e| {
                    StorageError::Storage(format!("Failed to create AWS S3 store: {}", e))
                })?;
            Ok(Arc::new(store))
        }
        ObjectStoreConfig::Local(local) => {
            std::fs::create_dir_all(&local.path).map_err(|e| {
                StorageError::Storage(format!(
                    "Failed to create storage directory '{}': {}",
                    local.path, e
                ))
            })?;
            let store = object_store::local::LocalFileSystem::new_with_prefix(&local.path)
                .map_err(|e| {
                    StorageError::Storage(format!("Failed to create local filesystem store: {}", e))
                })?;
            Ok(Arc::new(store))
        }
    }
}

/// Creates a storage instance, wiring in `merge_operator` when given.
pub async fn create_storage(
    config: &StorageConfig,
    merge_operator: Option<Arc<dyn MergeOperator>>,
) -> StorageResult<Arc<dyn Storage>> {
    let mut builder = StorageBuilder::new(config.clone());
    if let Some(op) = merge_operator {
        builder = builder.with_merge_operator(op);
    }
    builder.build().await
}

pub struct StorageBuilder {
    config: StorageConfig,
    merge_operator: Option<Arc<dyn MergeOperator>>,
}

impl StorageBuilder {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            merge_operator: None,
        }
    }

    pub fn with_merge_operator(mut self, op: Arc<dyn MergeOperator>) -> Self {
        self.merge_operator = Some(op);
        self
    }

    pub async fn build(self) -> StorageResult<Arc<dyn Storage>> {
        match &self.config {
            StorageConfig::InMemory => {
                let storage = match self.merge_operator {
                    Some(op) => InMemoryStorage::with_merge_operator(op),
                    None => InMemoryStorage::new(),
                };
                Ok(Arc::new(storage))
            }
            StorageConfig::SlateDb(slate_config) => {
                let storage = create_slatedb_storage(slate_config, self.merge_operator).await?;
                Ok(Arc::new(storage))
            }
        }
    }
}

async fn create_slatedb_storage(
    config: &SlateDbStorageConfig,
    merge_operator: Option<Arc<dyn MergeOperator>>,
) -> StorageResult<SlateDbStorage> {
    let object_store = create_object_store(&config.object_store)?;

    let settings = match &config.settings_path {
        Some(path) => Settings::from_file(path).map_err(|e| {
            StorageError::Storage(format!(
                "Failed to load SlateDB settings from {}: {}",
                path, e
            ))
        })?,
        None => Settings::load().unwrap_or_default(),
    };

    let mut db_builder = DbBuilder::new(config.path.clone(), object_store).with_settings(settings);
    if let Some(op) = merge_operator {
        let adapter = SlateDbStorage::merge_operator_adapter(op);
        db_builder = db_builder.with_merge_operator(Arc::new(adapter));
    }

    let db = db_builder
        .build()
        .await
        .map_err(|e| StorageError::Storage(format!("Failed to create SlateDB: {}", e)))?;

    tracing::info!(path = %config.path, "opened SlateDB storage");
    Ok(SlateDbStorage::new(Arc::new(db)))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::Record;

    #[tokio::test]
    async fn should_build_in_memory_storage() {
        // given
        let storage = create_storage(&StorageConfig::InMemory, None).await.unwrap();

        // when
        storage
            .put(vec![Record::new(Bytes::from("k"), Bytes::from("v"))])
            .await
            .unwrap();

        // then
        let got = storage.get(Bytes::from("k")).await.unwrap();
        assert_eq!(got.map(|r| r.value), Some(Bytes::from("v")));
    }

    #[tokio::test]
    async fn should_build_slatedb_storage_on_in_memory_object_store() {
        // given
        let config = StorageConfig::SlateDb(SlateDbStorageConfig {
            path: "factory-test".to_string(),
            object_store: ObjectStoreConfig::InMemory,
            settings_path: None,
        });

        // when
        let storage = create_storage(&config, None).await.unwrap();
        storage
            .put(vec![Record::new(Bytes::from("k"), Bytes::from("v"))])
            .await
            .unwrap();

        // then
        let got = storage.get(Bytes::from("k")).await.unwrap();
        assert_eq!(got.map(|r| r.value), Some(Bytes::from("v")));
        storage.close().await.unwrap();
    }
}
