//! Error types for the expertise registry and node selector.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or empty announcement payload. The batch was not applied.
    #[error("Invalid announcement: {0}")]
    InvalidAnnouncement(String),

    /// Two vectors of unequal length were compared.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A vector with zero magnitude cannot be normalized.
    #[error("Degenerate vector: zero magnitude cannot be normalized")]
    DegenerateVector,

    /// The embedding collaborator failed or the model is unavailable.
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// The persistence collaborator failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a front end should treat this error as "no usable match"
    /// rather than a failure.
    pub fn is_no_match(&self) -> bool {
        matches!(self, Error::DegenerateVector | Error::DimensionMismatch { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_classification() {
        assert!(Error::DegenerateVector.is_no_match());
        assert!(Error::DimensionMismatch {
            expected: 3,
            got: 2
        }
        .is_no_match());
        assert!(!Error::InvalidAnnouncement("empty".into()).is_no_match());
        assert!(!Error::Store("down".into()).is_no_match());
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = Error::DimensionMismatch {
            expected: 384,
            got: 768,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 384, got 768");
    }
}
