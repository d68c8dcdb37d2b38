//! Similarity-ranked node selection.
//!
//! [`NodeSelector`] scores every announcement in a registry [`Snapshot`]
//! against a query vector with an exact linear scan. It keeps no state
//! between calls; each call takes a fresh snapshot so results always reflect
//! the latest sweep.
//!
//! [`ExpertiseQuery`] adds the embedding step: it turns a natural-language
//! question into a query vector through an [`EmbeddingProvider`] and ranks
//! the current registry contents against it. It embeds expertise text the
//! same way when a node announces itself.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::registry::vector::{normalize, score_normalized};
use crate::registry::{AnnouncementEntry, ExpertiseRegistry, Snapshot};
use crate::telemetry as m;

/// Number of matches returned by [`ExpertiseQuery::find_best_match`] callers
/// that do not choose one.
pub const DEFAULT_TOP_K: usize = 1;

/// Default minimum score for threshold queries.
pub const DEFAULT_THRESHOLD: f32 = 0.8;

/// One ranked announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMatch {
    pub node_id: String,
    pub key: String,
    /// Similarity in `[0, 1]`
    pub score: f32,
    pub model: String,
    /// Advisory expertise text of the matched announcement
    pub expertise: String,
}

/// Stateless ranking of snapshot entries against a query vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeSelector;

impl NodeSelector {
    pub fn new() -> Self {
        Self
    }

    /// Rank entries of `query_model` by descending score.
    ///
    /// Ties are broken by ascending `(node_id, key)`. Entries announced with
    /// another model are excluded. Entries whose vector has zero magnitude or
    /// a different length than the query are skipped. `top_k = None` returns
    /// every scored entry.
    ///
    /// # Errors
    ///
    /// [`Error::DegenerateVector`] if `query` has zero magnitude.
    pub fn rank(
        &self,
        snapshot: &Snapshot,
        query: &[f32],
        query_model: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<NodeMatch>> {
        let query = normalize(query)?;

        let mut degenerate = 0usize;
        let mut mismatched = 0usize;
        let mut matches = Vec::new();

        for announcement in snapshot.iter().filter(|a| a.model == query_model) {
            let candidate = match normalize(&announcement.vector) {
                Ok(v) => v,
                Err(_) => {
                    degenerate += 1;
                    continue;
                }
            };
            let score = match score_normalized(&query, &candidate) {
                Ok(score) => score,
                Err(Error::DimensionMismatch { .. }) => {
                    mismatched += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            matches.push(NodeMatch {
                node_id: announcement.node_id.clone(),
                key: announcement.key.clone(),
                score,
                model: announcement.model.clone(),
                expertise: announcement.expertise.clone(),
            });
        }

        if degenerate > 0 || mismatched > 0 {
            debug!(
                model = %query_model,
                degenerate,
                mismatched,
                "Skipped announcements that cannot be scored"
            );
        }

        matches.sort_by(compare_matches);
        if let Some(k) = top_k {
            matches.truncate(k);
        }
        metrics::counter!(m::QUERIES_RANKED).increment(1);
        Ok(matches)
    }

    /// Every entry of `query_model` scoring at least `threshold`, in
    /// [`rank`](Self::rank) order.
    pub fn above_threshold(
        &self,
        snapshot: &Snapshot,
        query: &[f32],
        query_model: &str,
        threshold: f32,
    ) -> Result<Vec<NodeMatch>> {
        let mut matches = self.rank(snapshot, query, query_model, None)?;
        matches.retain(|m| m.score >= threshold);
        Ok(matches)
    }
}

fn compare_matches(a: &NodeMatch, b: &NodeMatch) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.node_id.cmp(&b.node_id))
        .then_with(|| a.key.cmp(&b.key))
}

/// Embedding-backed access to the registry: announce expertise text and
/// answer questions against it.
pub struct ExpertiseQuery {
    registry: Arc<ExpertiseRegistry>,
    provider: Arc<dyn EmbeddingProvider>,
    selector: NodeSelector,
}

impl ExpertiseQuery {
    pub fn new(registry: Arc<ExpertiseRegistry>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            registry,
            provider,
            selector: NodeSelector::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ExpertiseRegistry> {
        &self.registry
    }

    /// Embed each `(key, expertise text)` topic with `model` and upsert the
    /// results as the full entry set of `node_id`.
    ///
    /// Nothing is written if any embedding fails; the provider error is
    /// returned untouched. Returns the number of entries written.
    pub async fn announce<K, T>(&self, node_id: &str, topics: &[(K, T)], model: &str) -> Result<usize>
    where
        K: AsRef<str>,
        T: AsRef<str>,
    {
        let mut entries = Vec::with_capacity(topics.len());
        for (key, text) in topics {
            let vector = self.provider.embed(text.as_ref(), model).await?;
            entries.push(AnnouncementEntry::new(key.as_ref(), text.as_ref(), model, vector));
        }
        let written = self.registry.upsert(node_id, entries).await?;
        debug!(node_id = %node_id, written, model = %model, "Announced expertise");
        Ok(written)
    }

    /// Best matching announcements for `question`, embedded with `model`.
    ///
    /// Embedding provider errors are returned untouched.
    pub async fn find_best_match(
        &self,
        question: &str,
        model: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<NodeMatch>> {
        let query = self.provider.embed(question, model).await?;
        let snapshot = self.registry.snapshot().await;
        self.selector.rank(&snapshot, &query, model, top_k)
    }

    /// Announcements scoring at least `threshold` for `question`.
    pub async fn find_above_threshold(
        &self,
        question: &str,
        model: &str,
        threshold: f32,
    ) -> Result<Vec<NodeMatch>> {
        let query = self.provider.embed(question, model).await?;
        let snapshot = self.registry.snapshot().await;
        self.selector
            .above_threshold(&snapshot, &query, model, threshold)
    }
}
