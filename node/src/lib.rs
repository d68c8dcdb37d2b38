//! ExpertMesh node library.
//!
//! Nodes announce their expertise as embedding vectors; a querying party
//! finds the node(s) whose expertise best matches a question.
//!
//! - [`ExpertiseRegistry`]: announcements keyed by `(node_id, key)` with
//!   snapshot reads and expiry
//! - [`NodeSelector`]: exact similarity ranking over a registry snapshot
//! - [`ExpiryScheduler`]: periodic sweep of stale announcements
//! - [`Store`] and [`EmbeddingProvider`]: persistence and embedding
//!   collaborators

pub mod config;
pub mod embedding;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod store;
pub mod telemetry;

pub use config::{EmbeddingConfig, NodeConfig, RegistryConfig, StorageBackend, StorageConfig};
pub use embedding::{CachedEmbeddingProvider, EmbeddingProvider, FastEmbedProvider};
pub use error::{Error, Result};
pub use registry::{
    Announcement, AnnouncementEntry, Clock, CompositeKey, ExpertiseRegistry, ManualClock,
    Snapshot, StoreFailure, StoreOperation, SystemClock, Timestamp,
};
pub use scheduler::{ExpiryScheduler, ExpirySchedulerHandle, SchedulerStatus};
pub use selector::{ExpertiseQuery, NodeMatch, NodeSelector};
pub use store::{MemoryStore, RocksStore, Store};
