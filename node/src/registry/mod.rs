//! Expertise registry.
//!
//! Authoritative in-memory mapping of announcements keyed by
//! `(node_id, key)`, with optional write-through to a [`Store`].
//!
//! # Concurrency
//!
//! ```text
//!  upsert / sweep / delete ──▶ write_lock (Mutex) ──▶ entries.write()
//!                                        │
//!                                        └──▶ write queue ──▶ writer task ──▶ store
//!  snapshot / list_by_node ─────────────────────────▶ entries.read()
//! ```
//!
//! The map is copy-on-write behind an `Arc`. A snapshot clones the `Arc`, so
//! it is a consistent point-in-time view and later mutations never show
//! through it. Each mutation is applied under a single write guard, so
//! readers see all entries of an upsert or none. Each mutation is queued for
//! the store while the mutation mutex is held, so the store sees writes in
//! the same order as memory. A background task performs the store I/O;
//! mutations never wait for it. [`ExpertiseRegistry::flush`] waits until the
//! queue has drained.

pub mod clock;
mod types;
pub mod vector;
mod writer;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use types::{Announcement, AnnouncementEntry, CompositeKey, Snapshot};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::telemetry as m;
use crate::store::Store;
use types::AnnouncementMap;
use writer::StoreWriter;

/// Buffered store failures per subscriber before old ones are dropped.
const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Which write-through operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOperation {
    ReplaceForNode,
    DeleteForNode,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOperation::ReplaceForNode => write!(f, "replace_for_node"),
            StoreOperation::DeleteForNode => write!(f, "delete_for_node"),
        }
    }
}

/// A write-through failure. The in-memory mutation it belonged to was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFailure {
    pub operation: StoreOperation,
    pub node_id: String,
    pub message: String,
}

/// Registry of node expertise announcements.
pub struct ExpertiseRegistry {
    entries: RwLock<Arc<AnnouncementMap>>,
    write_lock: Mutex<()>,
    store: Option<Arc<dyn Store>>,
    writer: Option<StoreWriter>,
    clock: Arc<dyn Clock>,
    retention_secs: u64,
    failures: broadcast::Sender<StoreFailure>,
}

impl fmt::Debug for ExpertiseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpertiseRegistry")
            .field("retention_secs", &self.retention_secs)
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl ExpertiseRegistry {
    /// Create an empty registry using wall-clock time and no store.
    pub fn new(config: &RegistryConfig) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(Arc::new(AnnouncementMap::new())),
            write_lock: Mutex::new(()),
            store: None,
            writer: None,
            clock: Arc::new(SystemClock),
            retention_secs: config.retention_secs,
            failures,
        }
    }

    /// Write mutations through to `store`.
    ///
    /// Spawns the store writer task, so this must be called from within a
    /// Tokio runtime.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.writer = Some(StoreWriter::spawn(store.clone(), self.failures.clone()));
        self.store = Some(store);
        self
    }

    /// Use `clock` for `last_announced` stamps and snapshot freshness.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retention_secs(&self) -> u64 {
        self.retention_secs
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Receive write-through failures from this point on.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<StoreFailure> {
        self.failures.subscribe()
    }

    /// Replace the full entry set of `node_id` with `entries`.
    ///
    /// Keys the node announced before but omits now are removed. A key
    /// repeated within the batch keeps its last occurrence. Every written
    /// entry gets `last_announced = now`.
    ///
    /// Returns the number of distinct entries written.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidAnnouncement`] if the batch is empty or any entry is
    /// malformed. Nothing is applied in that case.
    pub async fn upsert(&self, node_id: &str, entries: Vec<AnnouncementEntry>) -> Result<usize> {
        if let Err(e) = validate_batch(node_id, &entries) {
            warn!(node_id = %node_id, error = %e, "Rejected announcement");
            metrics::counter!(m::ANNOUNCEMENTS_REJECTED).increment(1);
            return Err(e);
        }

        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();

        let mut by_key: BTreeMap<String, Announcement> = BTreeMap::new();
        for entry in entries {
            by_key.insert(entry.key.clone(), Announcement::from_entry(node_id, entry, now));
        }
        let rows: Vec<Announcement> = by_key.into_values().collect();

        let (replaced, total) = {
            let mut current = self.entries.write().await;
            let map = Arc::make_mut(&mut *current);
            let replaced = remove_node(map, node_id);
            for row in &rows {
                map.insert(row.composite_key(), row.clone());
            }
            (replaced, map.len())
        };
        metrics::gauge!(m::LIVE_ENTRIES).set(total as f64);
        metrics::counter!(m::ANNOUNCEMENTS_WRITTEN).increment(rows.len() as u64);
        debug!(
            node_id = %node_id,
            written = rows.len(),
            replaced,
            "Applied announcement"
        );

        let written = rows.len();
        self.write_through(node_id, rows);
        Ok(written)
    }

    /// Remove every entry of `node_id`. Returns the number removed.
    pub async fn delete_node(&self, node_id: &str) -> usize {
        let _guard = self.write_lock.lock().await;
        let (removed, total) = {
            let mut current = self.entries.write().await;
            let present = current
                .range(CompositeKey::new(node_id, "")..)
                .next()
                .is_some_and(|(k, _)| k.node_id == node_id);
            if !present {
                return 0;
            }
            let map = Arc::make_mut(&mut *current);
            (remove_node(map, node_id), map.len())
        };
        metrics::gauge!(m::LIVE_ENTRIES).set(total as f64);
        info!(node_id = %node_id, removed, "Deleted node announcements");

        self.write_through(node_id, Vec::new());
        removed
    }

    /// Point-in-time copy of the live entries, in composite-key order.
    ///
    /// Entries older than the retention window are excluded even if the
    /// sweep has not removed them yet.
    pub async fn snapshot(&self) -> Snapshot {
        let entries = self.entries.read().await.clone();
        Snapshot::new(entries, self.clock.now(), self.retention_secs)
    }

    /// Live entries grouped by node.
    pub async fn list_by_node(&self) -> BTreeMap<String, Vec<Announcement>> {
        let snapshot = self.snapshot().await;
        let mut grouped: BTreeMap<String, Vec<Announcement>> = BTreeMap::new();
        for announcement in snapshot.iter() {
            grouped
                .entry(announcement.node_id.clone())
                .or_default()
                .push(announcement.clone());
        }
        grouped
    }

    /// Delete every entry with `now - last_announced > retention_secs`.
    ///
    /// Returns the number of entries removed; 0 when nothing is stale.
    /// Store failures are reported through [`Self::subscribe_failures`] and
    /// the log, never returned.
    pub async fn sweep_expired(&self, now: Timestamp, retention_secs: u64) -> usize {
        let _guard = self.write_lock.lock().await;

        let (removed, affected) = {
            let mut current = self.entries.write().await;
            let stale: Vec<CompositeKey> = current
                .iter()
                .filter(|(_, a)| !a.is_live(now, retention_secs))
                .map(|(k, _)| k.clone())
                .collect();
            if stale.is_empty() {
                return 0;
            }

            let map = Arc::make_mut(&mut *current);
            for key in &stale {
                map.remove(key);
            }
            metrics::gauge!(m::LIVE_ENTRIES).set(map.len() as f64);

            let nodes: BTreeSet<&str> = stale.iter().map(|k| k.node_id.as_str()).collect();
            let affected: Vec<(String, Vec<Announcement>)> = nodes
                .into_iter()
                .map(|node| (node.to_string(), node_rows(map, node)))
                .collect();
            (stale.len(), affected)
        };

        metrics::counter!(m::ANNOUNCEMENTS_EXPIRED).increment(removed as u64);
        info!(removed, nodes = affected.len(), "Expired stale announcements");

        for (node_id, remaining) in affected {
            self.write_through(&node_id, remaining);
        }
        removed
    }

    /// Load rows persisted by the store into memory.
    ///
    /// Intended for startup. A composite key present more than once keeps
    /// the row with the newest `last_announced`. Rows with empty vectors are
    /// skipped. Returns the number of entries held afterwards.
    pub async fn hydrate(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let _guard = self.write_lock.lock().await;
        self.flush().await;
        let rows = store.list_all().await?;

        let mut current = self.entries.write().await;
        let map = Arc::make_mut(&mut *current);
        let mut skipped = 0usize;
        for row in rows {
            if row.vector.is_empty() {
                skipped += 1;
                continue;
            }
            let key = row.composite_key();
            match map.get(&key) {
                Some(existing) if existing.last_announced >= row.last_announced => {}
                _ => {
                    map.insert(key, row);
                }
            }
        }
        if skipped > 0 {
            warn!(skipped, "Skipped stored rows with empty vectors");
        }
        metrics::gauge!(m::LIVE_ENTRIES).set(map.len() as f64);
        info!(entries = map.len(), "Hydrated registry from store");
        Ok(map.len())
    }

    /// Entries held in memory, including stale ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Distinct nodes with at least one entry in memory.
    pub async fn node_count(&self) -> usize {
        let entries = self.entries.read().await;
        entries
            .keys()
            .map(|k| k.node_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Wait until every store write queued so far has been applied.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    /// Drain pending store writes and release the store.
    pub async fn close(mut self) {
        if let Some(writer) = self.writer.take() {
            writer.close().await;
        }
    }

    /// Queue the node's current rows for the store; no rows deletes.
    /// Callers hold `write_lock`.
    fn write_through(&self, node_id: &str, rows: Vec<Announcement>) {
        if let Some(writer) = &self.writer {
            writer.enqueue(node_id, rows);
        }
    }
}

fn validate_batch(node_id: &str, entries: &[AnnouncementEntry]) -> Result<()> {
    if node_id.trim().is_empty() {
        return Err(Error::InvalidAnnouncement(
            "node id must not be empty".to_string(),
        ));
    }
    if entries.is_empty() {
        return Err(Error::InvalidAnnouncement(format!(
            "node '{}' announced no entries",
            node_id
        )));
    }
    for entry in entries {
        if entry.key.is_empty() {
            return Err(Error::InvalidAnnouncement(format!(
                "node '{}' announced an entry without a key",
                node_id
            )));
        }
        if entry.model.is_empty() {
            return Err(Error::InvalidAnnouncement(format!(
                "entry '{}' of node '{}' has no model",
                entry.key, node_id
            )));
        }
        if entry.vector.is_empty() {
            return Err(Error::InvalidAnnouncement(format!(
                "entry '{}' of node '{}' has an empty vector",
                entry.key, node_id
            )));
        }
        if entry.vector.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidAnnouncement(format!(
                "entry '{}' of node '{}' has non-finite vector components",
                entry.key, node_id
            )));
        }
    }
    Ok(())
}

/// Rows of one node. All keys of a node are contiguous in the map.
fn node_rows(map: &AnnouncementMap, node_id: &str) -> Vec<Announcement> {
    map.range(CompositeKey::new(node_id, "")..)
        .take_while(|(k, _)| k.node_id == node_id)
        .map(|(_, a)| a.clone())
        .collect()
}

fn remove_node(map: &mut AnnouncementMap, node_id: &str) -> usize {
    let keys: Vec<CompositeKey> = map
        .range(CompositeKey::new(node_id, "")..)
        .take_while(|(k, _)| k.node_id == node_id)
        .map(|(k, _)| k.clone())
        .collect();
    for key in &keys {
        map.remove(key);
    }
    keys.len()
}
