//! Partitioned point storage: the backend capability, its key-value
//! implementation and the batched fetch engine on top of it.

pub(crate) mod codec;
pub(crate) mod fetch;
pub(crate) mod kv;
pub(crate) mod store;

pub use kv::{KvBackend, PointsMergeOperator};
pub use store::{BackendStore, Store};

use async_trait::async_trait;
use bytes::Bytes;
use common::StorageError;
use tokio::task::JoinError;

use crate::model::StepMismatch;
use crate::partition::WindowError;

/// Error type for backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The addressed table does not exist. Readers treat this as no data.
    NotFound(String),

    /// Failures reported by the underlying storage engine.
    Storage(String),

    /// Malformed point encoding.
    Encoding(String),

    /// A query window that cannot be mapped onto partitions.
    InvalidRange(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            Error::InvalidRange(msg) => write!(f, "Invalid range: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Storage(msg) => Error::Storage(msg),
            StorageError::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::Internal(format!("fetch task failed: {}", err))
    }
}

impl From<WindowError> for Error {
    fn from(err: WindowError) -> Self {
        Error::InvalidRange(err.to_string())
    }
}

impl From<StepMismatch> for Error {
    fn from(err: StepMismatch) -> Self {
        Error::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The partitioned key-value service that holds encoded points.
///
/// Data lives in tables named per tier and table epoch (see
/// [`crate::partition`]). Inside a table an item is addressed by
/// `(metric name, item epoch)` and holds a set of 16-byte points.
/// Implementations are shared by all concurrent fetch tasks.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Creates `table`. Creating a table that exists is not an error.
    async fn create_table(&self, table: &str) -> Result<()>;

    /// Reads the items of `names` at `item_epoch` in one request.
    ///
    /// Names without an item are left out of the result. Returns
    /// [`Error::NotFound`] when `table` does not exist.
    async fn batch_get(
        &self,
        table: &str,
        item_epoch: i64,
        names: &[String],
    ) -> Result<Vec<(String, Bytes)>>;

    /// Adds `points` to the item's point set. A point replaces any stored
    /// point with the same timestamp.
    async fn put(&self, table: &str, item_epoch: i64, name: &str, points: &[(i64, f64)])
    -> Result<()>;
}
