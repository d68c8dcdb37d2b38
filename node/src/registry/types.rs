//! Announcement and snapshot types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::clock::Timestamp;

/// Unique identity of an announcement: `(node_id, key)`.
///
/// Ordering is lexicographic on node id, then topic key. Ranking uses it to
/// break score ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    pub node_id: String,
    pub key: String,
}

impl CompositeKey {
    pub fn new(node_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node_id, self.key)
    }
}

/// One topic in a node's announcement batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementEntry {
    /// Topic/capability identifier, unique per node
    pub key: String,
    /// Human-readable description; advisory only
    pub expertise: String,
    /// Embedding model that produced `vector`
    pub model: String,
    pub vector: Vec<f32>,
}

impl AnnouncementEntry {
    pub fn new(
        key: impl Into<String>,
        expertise: impl Into<String>,
        model: impl Into<String>,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            key: key.into(),
            expertise: expertise.into(),
            model: model.into(),
            vector,
        }
    }
}

/// A stored announcement, one registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub node_id: String,
    pub key: String,
    pub expertise: String,
    pub model: String,
    pub vector: Vec<f32>,
    /// Time of the most recent upsert for this composite key
    pub last_announced: Timestamp,
}

impl Announcement {
    pub fn from_entry(node_id: impl Into<String>, entry: AnnouncementEntry, now: Timestamp) -> Self {
        Self {
            node_id: node_id.into(),
            key: entry.key,
            expertise: entry.expertise,
            model: entry.model,
            vector: entry.vector,
            last_announced: now,
        }
    }

    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey::new(self.node_id.clone(), self.key.clone())
    }

    /// Seconds since the last announcement. Future timestamps count as age 0.
    pub fn age(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.last_announced)
    }

    /// Whether the announcement is still inside the retention window.
    pub fn is_live(&self, now: Timestamp, retention_secs: u64) -> bool {
        self.age(now) <= retention_secs
    }
}

pub(crate) type AnnouncementMap = BTreeMap<CompositeKey, Announcement>;

/// Point-in-time, read-only view of the registry's live entries.
///
/// Holds a shared reference to an immutable map version, so later registry
/// mutations are never visible through it. Iteration is in ascending
/// composite-key order.
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: Arc<AnnouncementMap>,
    freshness: Option<(Timestamp, u64)>,
}

impl Snapshot {
    pub(crate) fn new(entries: Arc<AnnouncementMap>, now: Timestamp, retention_secs: u64) -> Self {
        Self {
            entries,
            freshness: Some((now, retention_secs)),
        }
    }

    /// Build a snapshot directly from announcements, without freshness
    /// filtering. A repeated composite key keeps the last occurrence.
    pub fn from_announcements(announcements: impl IntoIterator<Item = Announcement>) -> Self {
        let entries = announcements
            .into_iter()
            .map(|a| (a.composite_key(), a))
            .collect::<AnnouncementMap>();
        Self {
            entries: Arc::new(entries),
            freshness: None,
        }
    }

    /// Live announcements in composite-key order.
    pub fn iter(&self) -> impl Iterator<Item = &Announcement> + '_ {
        let freshness = self.freshness;
        self.entries.values().filter(move |a| match freshness {
            Some((now, retention)) => a.is_live(now, retention),
            None => true,
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Time the snapshot was taken, if it came from a registry.
    pub fn taken_at(&self) -> Option<Timestamp> {
        self.freshness.map(|(now, _)| now)
    }

    pub fn to_vec(&self) -> Vec<Announcement> {
        self.iter().cloned().collect()
    }
}
