//! Node configuration.
//!
//! Loaded from a TOML file. Defaults match the reference deployment:
//! a 120 second retention window swept every 30 seconds.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::embedding::DEFAULT_MODEL;
use crate::error::{Error, Result};

/// Default retention window in seconds.
pub const DEFAULT_RETENTION_SECS: u64 = 120;

/// Default interval between expiry sweeps in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Default number of cached query embeddings.
pub const DEFAULT_EMBEDDING_CACHE_CAPACITY: u64 = 1024;

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Registry freshness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum age of an announcement before it expires.
    pub retention_secs: u64,
    /// How often the expiry sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl RegistryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Which persistence backend mirrors the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store, lost on restart
    #[default]
    Memory,
    /// RocksDB database on disk
    Rocksdb,
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database directory, used by the `rocksdb` backend.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("data/expertise"),
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Local model used by `announce` and `query` (downloaded on first use).
    pub model: String,
    /// Maximum cached query embeddings (0 disables the cache).
    pub cache_capacity: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            cache_capacity: DEFAULT_EMBEDDING_CACHE_CAPACITY,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: NodeConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    /// Reject settings the registry cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.registry.retention_secs == 0 {
            return Err(Error::Config(
                "registry.retention_secs must be greater than 0".to_string(),
            ));
        }
        if self.registry.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "registry.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(Error::Config(
                "embedding.model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = NodeConfig::default();
        assert_eq!(config.registry.retention_secs, 120);
        assert_eq!(config.registry.sweep_interval_secs, 30);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.embedding.model, DEFAULT_MODEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = NodeConfig::default();
        config.registry.retention_secs = 300;
        config.storage.backend = StorageBackend::Rocksdb;
        config.save(&path).unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.registry.retention_secs, 300);
        assert_eq!(loaded.storage.backend, StorageBackend::Rocksdb);
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\nbackend = \"rocksdb\"\npath = \"/tmp/x\"\n").unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.registry.retention_secs, DEFAULT_RETENTION_SECS);
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_rejects_zero_retention() {
        let mut config = NodeConfig::default();
        config.registry.retention_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retention_secs"));
    }

    #[test]
    fn test_rejects_zero_sweep_interval() {
        let mut config = NodeConfig::default();
        config.registry.sweep_interval_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_empty_model() {
        let mut config = NodeConfig::default();
        config.embedding.model = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
