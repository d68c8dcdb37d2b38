//! Caching wrapper for embedding providers.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use tracing::trace;

use super::EmbeddingProvider;
use crate::error::Result;

/// Memoizes embeddings by `(model, text)`.
///
/// Only successful embeddings are cached; a failed call is retried by the
/// next caller, not replayed from the cache.
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Cache<(String, String), Vec<f32>>,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
        }
    }

    /// Number of cached embeddings.
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every cached embedding.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let key = (model.to_string(), text.to_string());
        if let Some(vector) = self.cache.get(&key).await {
            trace!(model = %model, "Embedding cache hit");
            return Ok(vector);
        }

        let vector = self.inner.embed(text, model).await?;
        self.cache.insert(key, vector.clone()).await;
        Ok(vector)
    }
}
