//! In-memory store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::Store;
use crate::error::{Error, Result};
use crate::registry::Announcement;

/// Process-local [`Store`] keyed by node id.
///
/// Writes can be made to fail on demand, which lets tests exercise the
/// registry's store-failure reporting.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<String, Vec<Announcement>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. to simulate rows persisted by a previous run.
    pub async fn insert_rows(&self, rows: impl IntoIterator<Item = Announcement>) {
        let mut guard = self.rows.write().await;
        for row in rows {
            let node_rows = guard.entry(row.node_id.clone()).or_default();
            node_rows.retain(|r| r.key != row.key);
            node_rows.push(row);
        }
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn row_count(&self) -> usize {
        self.rows.read().await.values().map(Vec::len).sum()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Store("memory store is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_all(&self) -> Result<Vec<Announcement>> {
        let guard = self.rows.read().await;
        Ok(guard.values().flatten().cloned().collect())
    }

    async fn replace_for_node(&self, node_id: &str, rows: &[Announcement]) -> Result<()> {
        self.check_writable()?;
        let mut guard = self.rows.write().await;
        if rows.is_empty() {
            guard.remove(node_id);
        } else {
            guard.insert(node_id.to_string(), rows.to_vec());
        }
        Ok(())
    }

    async fn delete_for_node(&self, node_id: &str) -> Result<()> {
        self.check_writable()?;
        self.rows.write().await.remove(node_id);
        Ok(())
    }
}
