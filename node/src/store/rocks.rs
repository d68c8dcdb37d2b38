//! RocksDB-backed store.
//!
//! Key layout: `u32 BE node id length | node id | topic key`, so all rows of
//! one node share a prefix and sort together. Values are bincode-encoded
//! [`Announcement`] rows.

use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

use super::Store;
use crate::error::{Error, Result};
use crate::registry::Announcement;

/// [`Store`] persisted in a RocksDB database.
///
/// RocksDB calls are blocking; each operation runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to open RocksDB store");
            Error::Store(format!("open {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Opened RocksDB store");

        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DB) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || op(db.as_ref()))
            .await
            .map_err(|e| Error::Store(format!("blocking task failed: {}", e)))?
    }
}

fn node_prefix(node_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(4 + node_id.len());
    prefix.extend_from_slice(&(node_id.len() as u32).to_be_bytes());
    prefix.extend_from_slice(node_id.as_bytes());
    prefix
}

fn row_key(node_id: &str, key: &str) -> Vec<u8> {
    let mut out = node_prefix(node_id);
    out.extend_from_slice(key.as_bytes());
    out
}

/// Keys of every row stored for `node_id`.
fn node_keys(db: &DB, node_id: &str) -> Result<Vec<Box<[u8]>>> {
    let prefix = node_prefix(node_id);
    let mut keys = Vec::new();
    for item in db.iterator(IteratorMode::From(&prefix, Direction::Forward)) {
        let (key, _) = item?;
        if !key.starts_with(&prefix) {
            break;
        }
        keys.push(key);
    }
    Ok(keys)
}

#[async_trait]
impl Store for RocksStore {
    async fn list_all(&self) -> Result<Vec<Announcement>> {
        self.blocking(|db| {
            let mut rows = Vec::new();
            for item in db.iterator(IteratorMode::Start) {
                let (_, value) = item?;
                rows.push(bincode::deserialize::<Announcement>(&value)?);
            }
            Ok(rows)
        })
        .await
    }

    async fn replace_for_node(&self, node_id: &str, rows: &[Announcement]) -> Result<()> {
        let node_id = node_id.to_string();
        let rows = rows.to_vec();
        self.blocking(move |db| {
            let mut batch = WriteBatch::default();
            for key in node_keys(db, &node_id)? {
                batch.delete(key);
            }
            for row in &rows {
                batch.put(row_key(&node_id, &row.key), bincode::serialize(row)?);
            }
            db.write(batch)?;
            Ok(())
        })
        .await
    }

    async fn delete_for_node(&self, node_id: &str) -> Result<()> {
        let node_id = node_id.to_string();
        self.blocking(move |db| {
            let mut batch = WriteBatch::default();
            for key in node_keys(db, &node_id)? {
                batch.delete(key);
            }
            db.write(batch)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AnnouncementEntry;

    fn row(node: &str, key: &str, t: u64) -> Announcement {
        Announcement::from_entry(
            node,
            AnnouncementEntry::new(key, "rust", "all-MiniLM-L6-v2", vec![0.1, 0.2, 0.3]),
            t,
        )
    }

    #[test]
    fn test_prefix_does_not_collide() {
        // "n1" + "0key" must not share a prefix with node "n10"
        let a = row_key("n1", "0key");
        assert!(!a.starts_with(&node_prefix("n10")));
        assert!(a.starts_with(&node_prefix("n1")));
    }

    #[tokio::test]
    async fn test_replace_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        store
            .replace_for_node("n1", &[row("n1", "a", 1), row("n1", "b", 1)])
            .await
            .unwrap();
        store.replace_for_node("n10", &[row("n10", "a", 2)]).await.unwrap();
        store.replace_for_node("n1", &[row("n1", "c", 3)]).await.unwrap();

        let mut rows = store.list_all().await.unwrap();
        rows.sort_by(|a, b| a.composite_key().cmp(&b.composite_key()));
        let keys: Vec<_> = rows.iter().map(|r| r.composite_key().to_string()).collect();
        assert_eq!(keys, vec!["n1/c", "n10/a"]);
        assert_eq!(rows[0].last_announced, 3);
        assert_eq!(rows[0].vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_delete_for_node() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        store.replace_for_node("n1", &[row("n1", "a", 1)]).await.unwrap();
        store.replace_for_node("n2", &[row("n2", "a", 1)]).await.unwrap();
        store.delete_for_node("n1").await.unwrap();

        let rows = store.list_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].node_id, "n2");
    }

    #[tokio::test]
    async fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.replace_for_node("n1", &[row("n1", "ml", 42)]).await.unwrap();
        }
        let store = RocksStore::open(dir.path()).unwrap();
        let rows = store.list_all().await.unwrap();
        assert_eq!(rows, vec![row("n1", "ml", 42)]);
    }
}
