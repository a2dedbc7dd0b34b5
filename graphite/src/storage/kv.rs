//! Backend implementation over the common key-value [`Storage`].
//!
//! Key layout (all keys start with a version byte and a record type):
//!
//! ```text
//! table:  | 0x01 | 0x01 | table name (utf-8) |
//! item:   | 0x01 | 0x02 | u16 table len | table name | u64 item epoch | metric name (utf-8) |
//! ```
//!
//! The item epoch is stored with its sign bit flipped so that keys sort in
//! epoch order. An item value is a concatenation of encoded points, kept
//! sorted by timestamp by [`PointsMergeOperator`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use common::{BytesRange, MergeOperator, Record, Storage};

use super::codec::{decode_points, encode_points};
use super::{Backend, Error, Result};

const KEY_VERSION: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum RecordType {
    Table = 0x01,
    Item = 0x02,
}

fn table_key(table: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + table.len());
    buf.put_u8(KEY_VERSION);
    buf.put_u8(RecordType::Table as u8);
    buf.put_slice(table.as_bytes());
    buf.freeze()
}

fn item_prefix(table: &str, item_epoch: i64) -> BytesMut {
    let mut buf = BytesMut::with_capacity(12 + table.len());
    buf.put_u8(KEY_VERSION);
    buf.put_u8(RecordType::Item as u8);
    buf.put_u16(table.len() as u16);
    buf.put_slice(table.as_bytes());
    buf.put_u64((item_epoch as u64) ^ (1 << 63));
    buf
}

fn item_key(prefix: &[u8], name: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(prefix.len() + name.len());
    buf.put_slice(prefix);
    buf.put_slice(name.as_bytes());
    buf.freeze()
}

/// Stores tables as marker records and items as point-set records.
pub struct KvBackend {
    storage: Arc<dyn Storage>,
}

impl KvBackend {
    /// The storage must have been built with [`PointsMergeOperator`].
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn ensure_table(&self, table: &str) -> Result<()> {
        match self.storage.get(table_key(table)).await? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("table {}", table))),
        }
    }
}

#[async_trait]
impl Backend for KvBackend {
    async fn ping(&self) -> Result<()> {
        self.storage.get(table_key("")).await?;
        Ok(())
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        if table.len() > u16::MAX as usize {
            return Err(Error::Internal(format!(
                "table name too long: {} bytes",
                table.len()
            )));
        }
        self.storage.put(vec![Record::empty(table_key(table))]).await?;
        tracing::debug!(table, "created table");
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self, names))]
    async fn batch_get(
        &self,
        table: &str,
        item_epoch: i64,
        names: &[String],
    ) -> Result<Vec<(String, Bytes)>> {
        self.ensure_table(table).await?;
        let (Some(first), Some(last)) = (names.iter().min(), names.iter().max()) else {
            return Ok(Vec::new());
        };

        let prefix = item_prefix(table, item_epoch);
        let range = BytesRange::inclusive(item_key(&prefix, first), item_key(&prefix, last));
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();

        let mut items = Vec::new();
        for record in self.storage.scan(range).await? {
            let name = std::str::from_utf8(&record.key[prefix.len()..])
                .map_err(|e| Error::Encoding(format!("metric name is not utf-8: {}", e)))?;
            if wanted.contains(name) {
                items.push((name.to_string(), record.value));
            }
        }
        Ok(items)
    }

    async fn put(
        &self,
        table: &str,
        item_epoch: i64,
        name: &str,
        points: &[(i64, f64)],
    ) -> Result<()> {
        self.ensure_table(table).await?;
        let key = item_key(&item_prefix(table, item_epoch), name);
        self.storage
            .merge(vec![Record::new(key, encode_points(points))])
            .await?;
        Ok(())
    }
}

/// Unions two encoded point sets. On equal timestamps the newer point wins,
/// and the output is sorted by timestamp.
pub struct PointsMergeOperator;

impl MergeOperator for PointsMergeOperator {
    fn merge(&self, key: &Bytes, existing_value: Option<Bytes>, new_value: Bytes) -> Bytes {
        let new_points = match decode_points(&new_value) {
            Ok(points) => points,
            Err(e) => {
                tracing::warn!(key = ?key, error = %e, "dropping undecodable merge operand");
                return existing_value.unwrap_or_default();
            }
        };

        let mut merged = BTreeMap::new();
        if let Some(existing) = existing_value {
            match decode_points(&existing) {
                Ok(points) => merged.extend(points),
                Err(e) => {
                    tracing::warn!(key = ?key, error = %e, "replacing undecodable point set");
                }
            }
        }
        merged.extend(new_points);

        let points: Vec<(i64, f64)> = merged.into_iter().collect();
        encode_points(&points)
    }
}

#[cfg(test)]
mod tests {
    use common::storage::in_memory::InMemoryStorage;

    use super::*;

    fn backend() -> KvBackend {
        let storage = InMemoryStorage::with_merge_operator(Arc::new(PointsMergeOperator));
        KvBackend::new(Arc::new(storage))
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn should_report_missing_table_as_not_found() {
        // given
        let backend = backend();

        // when
        let result = backend.batch_get("t-1m1h-0", 0, &names(&["m"])).await;

        // then
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn should_return_only_requested_names() {
        // given
        let backend = backend();
        backend.create_table("t-1m1h-0").await.unwrap();
        for name in ["a.x", "a.xy", "b.x", "c.x"] {
            backend
                .put("t-1m1h-0", 0, name, &[(60, 1.0)])
                .await
                .unwrap();
        }

        // when
        let items = backend
            .batch_get("t-1m1h-0", 0, &names(&["c.x", "a.x"]))
            .await
            .unwrap();

        // then
        let got: Vec<&str> = items.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(got, vec!["a.x", "c.x"]);
    }

    #[tokio::test]
    async fn should_keep_items_of_other_epochs_apart() {
        // given
        let backend = backend();
        backend.create_table("t").await.unwrap();
        backend.put("t", 0, "m", &[(60, 1.0)]).await.unwrap();
        backend.put("t", 3600, "m", &[(3660, 2.0)]).await.unwrap();

        // when
        let items = backend.batch_get("t", 3600, &names(&["m"])).await.unwrap();

        // then
        assert_eq!(items.len(), 1);
        assert_eq!(decode_points(&items[0].1).unwrap(), vec![(3660, 2.0)]);
    }

    #[tokio::test]
    async fn should_union_points_across_puts() {
        // given
        let backend = backend();
        backend.create_table("t").await.unwrap();

        // when
        backend.put("t", 0, "m", &[(120, 2.0), (60, 1.0)]).await.unwrap();
        backend.put("t", 0, "m", &[(120, 20.0), (180, 3.0)]).await.unwrap();

        // then
        let items = backend.batch_get("t", 0, &names(&["m"])).await.unwrap();
        assert_eq!(
            decode_points(&items[0].1).unwrap(),
            vec![(60, 1.0), (120, 20.0), (180, 3.0)]
        );
    }

    #[tokio::test]
    async fn should_reject_put_into_missing_table() {
        // when
        let result = backend().put("nope", 0, "m", &[(0, 1.0)]).await;

        // then
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn should_sort_item_keys_by_epoch() {
        let negative = item_prefix("t", -3600);
        let zero = item_prefix("t", 0);
        let positive = item_prefix("t", 3600);
        assert!(negative < zero && zero < positive);
    }

    #[test]
    fn should_be_associative() {
        // given
        let op = PointsMergeOperator;
        let key = Bytes::from("k");
        let a = encode_points(&[(1, 1.0), (2, 2.0)]);
        let b = encode_points(&[(2, 20.0), (3, 3.0)]);
        let c = encode_points(&[(3, 30.0), (4, 4.0)]);

        // when
        let left = op.merge(&key, Some(op.merge(&key, Some(a.clone()), b.clone())), c.clone());
        let right = op.merge(&key, Some(a), op.merge(&key, Some(b), c));

        // then
        assert_eq!(left, right);
    }
}
