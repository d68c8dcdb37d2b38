//! Persistence collaborators for the expertise registry.
//!
//! The registry writes through to a [`Store`] after applying each mutation
//! in memory. In-memory state stays authoritative: a failed store write is
//! reported but never rolls the registry back.
//!
//! Backends:
//! - [`MemoryStore`]: process-local map, the default
//! - [`RocksStore`]: RocksDB on disk with bincode-encoded rows

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use crate::registry::Announcement;

/// Row store unique on `(node_id, key)`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Every stored row.
    async fn list_all(&self) -> Result<Vec<Announcement>>;

    /// Replace all rows of `node_id` with `rows`.
    async fn replace_for_node(&self, node_id: &str, rows: &[Announcement]) -> Result<()>;

    /// Remove all rows of `node_id`.
    async fn delete_for_node(&self, node_id: &str) -> Result<()>;
}

/// Open the store selected by configuration.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Rocksdb => Ok(Arc::new(RocksStore::open(&config.path)?)),
    }
}
