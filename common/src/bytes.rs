//! Key ranges for ordered scans over the storage keyspace.

use std::ops::Bound::{self, Included};
use std::ops::RangeBounds;

use bytes::Bytes;

/// A range over byte keys, passed to [`crate::StorageRead::scan`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytesRange {
    pub start: Bound<Bytes>,
    pub end: Bound<Bytes>,
}

impl BytesRange {
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    /// Range covering `[start, end]`, both ends included.
    pub fn inclusive(start: Bytes, end: Bytes) -> Self {
        Self::new(Included(start), Included(end))
    }
}

impl RangeBounds<Bytes> for BytesRange {
    fn start_bound(&self) -> Bound<&Bytes> {
        self.start.as_ref()
    }

    fn end_bound(&self) -> Bound<&Bytes> {
        self.end.as_ref()
    }
}
