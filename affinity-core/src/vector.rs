//! Similarity-searchable long-term memory.
//!
//! Archived and extracted facts end up here as [`VectorMemoryItem`]s. An
//! insert is refused when the user already has an item whose cosine
//! similarity is at or above the duplicate threshold; searches return only
//! items at or above the similarity threshold, best first.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::config::StorageConfig;
use crate::embedding::cosine_similarity;
use crate::error::{AffinityError, Result};
use crate::types::{UserId, VectorMemoryItem};

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    /// Stored text.
    pub text: String,
    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// Archival store keyed by user.
#[async_trait]
pub trait VectorMemory: Send + Sync {
    /// Insert an item.
    ///
    /// # Errors
    /// Returns [`AffinityError::DuplicateMemory`] when a near-identical item
    /// exists for the user, or a storage error.
    async fn add(&self, user: &UserId, text: &str, embedding: Vec<f32>) -> Result<()>;

    /// Items similar to `query`, best first, at most `limit`.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn search(&self, user: &UserId, query: &[f32], limit: usize) -> Result<Vec<ScoredMemory>>;

    /// Number of items stored for `user`.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn count(&self, user: &UserId) -> Result<usize>;

    /// Remove every item for `user`.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn delete_user(&self, user: &UserId) -> Result<()>;
}

/// Similarity thresholds shared by every vector store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityPolicy {
    /// At or above this, an insert is a duplicate.
    pub duplicate_threshold: f32,
    /// Below this, a search result is dropped.
    pub similarity_threshold: f32,
}

impl SimilarityPolicy {
    /// Thresholds from storage config.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            duplicate_threshold: config.duplicate_threshold,
            similarity_threshold: config.similarity_threshold,
        }
    }

    /// The closest existing item if it counts as a duplicate of `embedding`.
    #[must_use]
    pub fn find_duplicate<'a, I>(&self, existing: I, embedding: &[f32]) -> Option<f32>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        existing
            .into_iter()
            .map(|e| cosine_similarity(e, embedding))
            .filter(|s| *s >= self.duplicate_threshold)
            .max_by_key(|s| OrderedFloat(*s))
    }

    /// Rank candidates against `query`, keeping those above threshold.
    #[must_use]
    pub fn rank<'a, I>(&self, candidates: I, query: &[f32], limit: usize) -> Vec<ScoredMemory>
    where
        I: IntoIterator<Item = (&'a str, &'a [f32])>,
    {
        let mut hits: Vec<ScoredMemory> = candidates
            .into_iter()
            .map(|(text, emb)| ScoredMemory {
                text: text.to_string(),
                similarity: cosine_similarity(emb, query),
            })
            .filter(|m| m.similarity >= self.similarity_threshold)
            .collect();
        hits.sort_by_key(|m| std::cmp::Reverse(OrderedFloat(m.similarity)));
        hits.truncate(limit);
        hits
    }
}

impl Default for SimilarityPolicy {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Brute-force cosine store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryVectorMemory {
    items: DashMap<UserId, Vec<VectorMemoryItem>>,
    policy: SimilarityPolicy,
}

impl InMemoryVectorMemory {
    /// Create an empty store with the given thresholds.
    #[must_use]
    pub fn new(policy: SimilarityPolicy) -> Self {
        Self {
            items: DashMap::new(),
            policy,
        }
    }

    /// Every item stored for `user`, oldest first.
    #[must_use]
    pub fn items(&self, user: &UserId) -> Vec<VectorMemoryItem> {
        self.items.get(user).map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VectorMemory for InMemoryVectorMemory {
    async fn add(&self, user: &UserId, text: &str, embedding: Vec<f32>) -> Result<()> {
        // The entry guard holds the shard lock across check and insert.
        let mut entry = self.items.entry(user.clone()).or_default();
        if let Some(similarity) = self
            .policy
            .find_duplicate(entry.iter().map(|i| i.embedding.as_slice()), &embedding)
        {
            debug!(user = %user, similarity, "Rejected near-duplicate memory");
            return Err(AffinityError::DuplicateMemory {
                user: user.clone(),
                similarity,
            });
        }
        entry.push(VectorMemoryItem {
            user_id: user.clone(),
            text: text.to_string(),
            embedding,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn search(&self, user: &UserId, query: &[f32], limit: usize) -> Result<Vec<ScoredMemory>> {
        let Some(items) = self.items.get(user) else {
            return Ok(Vec::new());
        };
        Ok(self.policy.rank(
            items.iter().map(|i| (i.text.as_str(), i.embedding.as_slice())),
            query,
            limit,
        ))
    }

    async fn count(&self, user: &UserId) -> Result<usize> {
        Ok(self.items.get(user).map_or(0, |v| v.len()))
    }

    async fn delete_user(&self, user: &UserId) -> Result<()> {
        self.items.remove(user);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(x: f32, y: f32) -> Vec<f32> {
        let n = (x * x + y * y).sqrt();
        vec![x / n, y / n]
    }

    #[tokio::test]
    async fn near_duplicate_is_rejected() {
        let store = InMemoryVectorMemory::default();
        let user = UserId::from("u1");
        store.add(&user, "likes cats", unit(1.0, 0.0)).await.expect("first insert");

        // cos ≈ 0.995
        let err = store
            .add(&user, "loves cats", unit(1.0, 0.1))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, AffinityError::DuplicateMemory { .. }));
        assert_eq!(store.count(&user).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn duplicates_are_per_user() {
        let store = InMemoryVectorMemory::default();
        store.add(&"a".into(), "x", unit(1.0, 0.0)).await.expect("insert a");
        store.add(&"b".into(), "x", unit(1.0, 0.0)).await.expect("insert b");
    }

    #[tokio::test]
    async fn search_filters_and_ranks() {
        let store = InMemoryVectorMemory::default();
        let user = UserId::from("u1");
        store.add(&user, "east", unit(1.0, 0.0)).await.expect("insert");
        store.add(&user, "north", unit(0.0, 1.0)).await.expect("insert");
        // cos(45°) ≈ 0.707 to both, below duplicate threshold
        store.add(&user, "diagonal", unit(1.0, 1.0)).await.expect("insert");

        let hits = store.search(&user, &unit(1.0, 0.2), 10).await.expect("search");
        let texts: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "diagonal"]);
        assert!(hits[0].similarity >= hits[1].similarity);

        let limited = store.search(&user, &unit(1.0, 0.2), 1).await.expect("search");
        assert_eq!(limited.len(), 1);
    }
}
