//! Local ONNX embeddings via FastEmbed.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tracing::{debug, info};

use super::EmbeddingProvider;
use crate::error::{Error, Result};

/// Map an announced model name to a FastEmbed model.
pub(crate) fn resolve_model(name: &str) -> Option<EmbeddingModel> {
    match name {
        "all-MiniLM-L6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "nomic-embed-text" | "nomic-embed-text-v1" => Some(EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Some(EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Some(EmbeddingModel::MultilingualE5Small),
        _ => None,
    }
}

/// [`EmbeddingProvider`] serving a single locally loaded model.
///
/// The model is downloaded on first use. Inference is CPU-bound and runs
/// on the blocking pool.
pub struct FastEmbedProvider {
    model_name: String,
    model: Arc<TextEmbedding>,
}

impl FastEmbedProvider {
    /// Load `model_name`.
    pub fn new(model_name: &str) -> Result<Self> {
        let model = resolve_model(model_name).ok_or_else(|| {
            Error::EmbeddingProvider(format!("unsupported model '{}'", model_name))
        })?;

        info!(model = %model_name, "Loading embedding model");
        let embedding = TextEmbedding::try_new(
            InitOptions::new(model).with_show_download_progress(false),
        )
        .map_err(|e| Error::EmbeddingProvider(format!("failed to load '{}': {}", model_name, e)))?;

        Ok(Self {
            model_name: model_name.to_string(),
            model: Arc::new(embedding),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        if model != self.model_name {
            return Err(Error::EmbeddingProvider(format!(
                "model '{}' unavailable (serving '{}')",
                model, self.model_name
            )));
        }

        let engine = self.model.clone();
        let text = text.to_string();
        let vectors = tokio::task::spawn_blocking(move || {
            engine
                .embed(vec![text], None)
                .map_err(|e| Error::EmbeddingProvider(e.to_string()))
        })
        .await
        .map_err(|e| Error::EmbeddingProvider(format!("embedding task failed: {}", e)))??;

        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingProvider("model returned no embedding".to_string()))?;
        debug!(model = %model, dimension = vector.len(), "Embedded text");
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DEFAULT_MODEL;

    #[test]
    fn test_resolve_known_models() {
        assert!(resolve_model(DEFAULT_MODEL).is_some());
        assert!(resolve_model("nomic-embed-text").is_some());
        assert!(resolve_model("bge-small-en-v1.5").is_some());
    }

    #[test]
    fn test_unsupported_model_is_provider_error() {
        assert!(resolve_model("text-embedding-3-small").is_none());
        let err = FastEmbedProvider::new("text-embedding-3-small").err().unwrap();
        assert!(matches!(err, Error::EmbeddingProvider(_)));
    }
}
