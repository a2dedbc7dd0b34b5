pub mod bytes;
pub mod clock;
pub mod storage;

pub use bytes::BytesRange;
pub use clock::{Clock, MockClock, SystemClock};
pub use storage::config::StorageConfig;
pub use storage::factory::{StorageBuilder, create_storage};
pub use storage::{
    MergeOperator, Record, Storage, StorageError, StorageIterator, StorageRead, StorageResult,
};
