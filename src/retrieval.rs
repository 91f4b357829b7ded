//! Similarity retrieval: threshold, ordering and top-k truncation

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::owner::{GuardedBackend, Owner};
use crate::record::ScoredEntry;
use crate::storage::best_first;

/// Largest top-k a caller may ask for
pub const MAX_TOP_K: usize = 1000;

/// Most candidates pulled from a backend for one retrieval
pub const MAX_CANDIDATES: usize = 10_000;

/// Ranked results of a `retrieve` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    /// Best first, at most top-k entries, all at or above the threshold
    pub results: Vec<ScoredEntry>,

    /// Entries that cleared the threshold before truncation to top-k,
    /// counted over at most [`MAX_CANDIDATES`] candidates
    pub total_found: usize,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Format the results for injection into a prompt
    pub fn format_for_prompt(&self) -> String {
        if self.results.is_empty() {
            return String::new();
        }

        let mut parts = vec!["## Relevant Memories\n".to_string()];
        for hit in &self.results {
            parts.push(format!("- [{:.3}] {}\n", hit.score, hit.entry.content));
        }
        parts.join("")
    }
}

/// Retrieval engine for fetching relevant memories
#[derive(Clone)]
pub struct RetrievalEngine {
    embedder: Embedder,
    backend: GuardedBackend,
    default_top_k: usize,
    default_min_score: f32,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Embedder,
        backend: GuardedBackend,
        default_top_k: usize,
        default_min_score: f32,
    ) -> Self {
        Self {
            embedder,
            backend,
            default_top_k,
            default_min_score,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    pub fn default_min_score(&self) -> f32 {
        self.default_min_score
    }

    /// Memories of `owner` similar to `query`, best first.
    ///
    /// Nothing clearing `min_score` is an empty result, not an error.
    pub async fn retrieve(
        &self,
        owner: &Owner,
        query: &str,
        top_k: Option<usize>,
        min_score: Option<f32>,
    ) -> Result<Retrieval> {
        if query.trim().is_empty() {
            return Err(Error::invalid_input("query is required"));
        }
        let top_k = validate_top_k(top_k.unwrap_or(self.default_top_k))?;
        let min_score = validate_min_score(min_score.unwrap_or(self.default_min_score))?;

        let vector = self.embedder.embed(query).await?;
        let hits = self.candidates(owner, &vector, top_k, min_score).await?;
        let candidates = hits.len();

        let retrieval = rank(hits, min_score, top_k);
        debug!(
            "Retrieved {} of {} candidate memories for user {} (min_score {})",
            retrieval.results.len(),
            candidates,
            owner,
            min_score
        );
        Ok(retrieval)
    }

    /// Pull hits until every one at or above `min_score` has been seen.
    ///
    /// Backends order ties arbitrarily, so a plain `top_k` fetch could cut
    /// between records of equal score. Widening until the weakest hit falls
    /// below the threshold (or the owner runs out of records) leaves the
    /// final cut to [`rank`].
    async fn candidates(
        &self,
        owner: &Owner,
        vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredEntry>> {
        let mut fetch = (top_k + 1).min(MAX_CANDIDATES);
        loop {
            let hits = self.backend.query(owner, vector, fetch).await?;

            let exhausted = hits.len() < fetch;
            let below_threshold = hits.iter().any(|hit| hit.score < min_score);
            if exhausted || below_threshold || fetch == MAX_CANDIDATES {
                return Ok(hits);
            }

            fetch = (fetch * 2).min(MAX_CANDIDATES);
        }
    }
}

/// Drop hits below `min_score`, order by score then recency, keep `top_k`
pub fn rank(hits: Vec<ScoredEntry>, min_score: f32, top_k: usize) -> Retrieval {
    let mut results: Vec<ScoredEntry> = hits
        .into_iter()
        .filter(|hit| hit.score >= min_score)
        .collect();

    results.sort_by(best_first);

    let total_found = results.len();
    results.truncate(top_k);

    Retrieval {
        results,
        total_found,
    }
}

fn validate_top_k(top_k: usize) -> Result<usize> {
    if top_k == 0 || top_k > MAX_TOP_K {
        return Err(Error::invalid_input(format!(
            "top_k must be between 1 and {}, got {}",
            MAX_TOP_K, top_k
        )));
    }
    Ok(top_k)
}

pub(crate) fn validate_min_score(min_score: f32) -> Result<f32> {
    if !min_score.is_finite() || !(-1.0..=1.0).contains(&min_score) {
        return Err(Error::invalid_input(format!(
            "min_score must be within [-1, 1], got {}",
            min_score
        )));
    }
    Ok(min_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::record::{MemoryEntry, MemoryRecord};
    use crate::storage::{Consistency, VectorBackend};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Scores every record 0.9 and returns them oldest first, like an index
    /// that does not break ties
    #[derive(Default)]
    struct FlatBackend {
        entries: Mutex<Vec<MemoryEntry>>,
    }

    #[async_trait]
    impl VectorBackend for FlatBackend {
        fn name(&self) -> &'static str {
            "flat"
        }

        fn consistency(&self) -> Consistency {
            Consistency::Immediate
        }

        async fn insert(&self, record: MemoryRecord) -> Result<()> {
            self.entries.lock().await.push(record.entry());
            Ok(())
        }

        async fn query(&self, _: &[f32], top_k: usize, owner: &Owner) -> Result<Vec<ScoredEntry>> {
            Ok(self
                .entries
                .lock()
                .await
                .iter()
                .filter(|entry| owner.owns(&entry.owner))
                .take(top_k)
                .map(|entry| ScoredEntry {
                    entry: entry.clone(),
                    score: 0.9,
                })
                .collect())
        }

        async fn list(&self, owner: &Owner) -> Result<Vec<MemoryEntry>> {
            let entries = self.entries.lock().await;
            Ok(entries.iter().filter(|e| owner.owns(&e.owner)).cloned().collect())
        }
    }

    async fn flat_engine(records: usize) -> (RetrievalEngine, Vec<String>) {
        let backend = Arc::new(FlatBackend::default());
        let u1 = Owner::new("u1").unwrap();
        let mut ids = Vec::new();
        for _ in 0..records {
            let record = MemoryRecord::new(&u1, "same words", vec![1.0; 16]);
            ids.push(record.id.clone());
            backend.insert(record).await.unwrap();
        }

        let timeout = std::time::Duration::from_secs(1);
        let engine = RetrievalEngine::new(
            Embedder::new(Arc::new(HashingEmbedder::new(16)), 8000, timeout),
            GuardedBackend::new(backend, timeout),
            20,
            0.1,
        );
        (engine, ids)
    }

    fn hit(id: &str, score: f32, age_secs: i64) -> ScoredEntry {
        ScoredEntry {
            entry: MemoryEntry {
                id: id.to_string(),
                owner: "u1".to_string(),
                content: id.to_string(),
                created_at: Utc::now() - Duration::seconds(age_secs),
            },
            score,
        }
    }

    #[test]
    fn test_rank_thresholds_sorts_and_truncates() {
        let hits = vec![
            hit("low", 0.05, 0),
            hit("mid", 0.5, 0),
            hit("high", 0.9, 0),
            hit("edge", 0.1, 0),
        ];

        let ranked = rank(hits, 0.1, 2);
        assert_eq!(ranked.total_found, 3);
        let ids: Vec<_> = ranked.results.iter().map(|h| h.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
    }

    #[test]
    fn test_rank_breaks_ties_by_recency() {
        let hits = vec![hit("older", 0.7, 60), hit("newer", 0.7, 1)];
        let ranked = rank(hits, 0.0, 10);
        assert_eq!(ranked.results[0].entry.id, "newer");
    }

    #[tokio::test]
    async fn test_equal_scores_at_the_cut_go_to_the_newest() {
        let (engine, ids) = flat_engine(2).await;
        let u1 = Owner::new("u1").unwrap();

        let retrieval = engine.retrieve(&u1, "same words", Some(1), None).await.unwrap();
        assert_eq!(retrieval.results.len(), 1);
        assert_eq!(retrieval.results[0].entry.id, ids[1]);
    }

    #[tokio::test]
    async fn test_total_found_counts_past_top_k() {
        let (engine, ids) = flat_engine(5).await;
        let u1 = Owner::new("u1").unwrap();

        let retrieval = engine.retrieve(&u1, "same words", Some(2), None).await.unwrap();
        assert_eq!(retrieval.total_found, 5);
        let returned: Vec<_> = retrieval.results.iter().map(|h| h.entry.id.clone()).collect();
        assert_eq!(returned, vec![ids[4].clone(), ids[3].clone()]);
    }

    #[test]
    fn test_rank_nothing_clears() {
        let ranked = rank(vec![hit("a", 0.3, 0)], 0.95, 5);
        assert!(ranked.is_empty());
        assert_eq!(ranked.total_found, 0);
        assert_eq!(ranked.format_for_prompt(), "");
    }

    #[test]
    fn test_parameter_validation() {
        assert!(validate_top_k(0).is_err());
        assert!(validate_top_k(MAX_TOP_K + 1).is_err());
        assert_eq!(validate_top_k(20).unwrap(), 20);

        assert!(validate_min_score(f32::NAN).is_err());
        assert!(validate_min_score(1.01).is_err());
        assert!(validate_min_score(-1.0).is_ok());
    }

    #[test]
    fn test_format_for_prompt() {
        let ranked = rank(vec![hit("likes tea", 0.8, 0)], 0.1, 5);
        assert_eq!(
            ranked.format_for_prompt(),
            "## Relevant Memories\n- [0.800] likes tea\n"
        );
    }
}
