//! Embedding providers.
//!
//! The registry only stores and compares vectors; turning text into a
//! vector is delegated to an [`EmbeddingProvider`]:
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────────────┐     ┌──────────────────┐
//! │   question   │────▶│ CachedEmbeddingProvider │────▶│ FastEmbedProvider│
//! │    (text)    │     │     (moka, by model)    │     │  (ONNX, local)   │
//! └──────────────┘     └─────────────────────────┘     └──────────────────┘
//! ```
//!
//! Failures are returned as [`Error::EmbeddingProvider`](crate::Error) and
//! never retried here.

mod cache;
mod local;

pub use cache::CachedEmbeddingProvider;
pub use local::FastEmbedProvider;

use async_trait::async_trait;

use crate::error::Result;

/// Default embedding model (all-MiniLM-L6-v2, 384 dimensions)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Turns text into a vector for a named model.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text` with `model`.
    ///
    /// Fails when the model is unavailable or the underlying call fails.
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>>;
}
