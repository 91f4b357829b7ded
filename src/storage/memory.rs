//! In-process vector storage with exact cosine search

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{best_first, check_dimensions, Consistency, VectorBackend};
use crate::error::{Error, Result};
use crate::owner::Owner;
use crate::record::{MemoryEntry, MemoryRecord, ScoredEntry};

/// Vector storage held in process memory, partitioned by owner.
///
/// Reads only ever touch the requesting owner's partition. Writes are
/// visible to the next read.
pub struct InMemoryBackend {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    /// Fixed by configuration, or by the first insert when unset
    dimensions: Option<usize>,
    partitions: HashMap<String, Vec<MemoryRecord>>,
    ids: HashSet<String>,
}

impl InMemoryBackend {
    pub fn new(dimensions: Option<usize>) -> Self {
        Self {
            state: RwLock::new(State {
                dimensions,
                ..Default::default()
            }),
        }
    }

    /// Number of records across all owners
    pub async fn len(&self) -> usize {
        self.state.read().await.ids.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn consistency(&self) -> Consistency {
        Consistency::Immediate
    }

    async fn insert(&self, record: MemoryRecord) -> Result<()> {
        let mut state = self.state.write().await;

        let expected = *state.dimensions.get_or_insert(record.embedding.len());
        check_dimensions(expected, record.embedding.len())?;

        if !state.ids.insert(record.id.clone()) {
            return Err(Error::invalid_input(format!(
                "Memory id {} already exists",
                record.id
            )));
        }

        debug!("Inserted memory {} into in-memory index", record.id);
        state
            .partitions
            .entry(record.owner.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        owner: &Owner,
    ) -> Result<Vec<ScoredEntry>> {
        let state = self.state.read().await;

        if let Some(expected) = state.dimensions {
            check_dimensions(expected, vector.len())?;
        }

        let Some(partition) = state.partitions.get(owner.as_str()) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<ScoredEntry> = partition
            .iter()
            .map(|record| ScoredEntry {
                entry: record.entry(),
                score: cosine_similarity(vector, &record.embedding),
            })
            .collect();

        hits.sort_by(best_first);
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn list(&self, owner: &Owner) -> Result<Vec<MemoryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .partitions
            .get(owner.as_str())
            .map(|records| records.iter().map(MemoryRecord::entry).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, owner: &Owner, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;

        let removed = match state.partitions.get_mut(owner.as_str()) {
            Some(records) => {
                let before = records.len();
                records.retain(|record| record.id != id);
                records.len() != before
            }
            None => false,
        };

        if removed {
            state.ids.remove(id);
        }
        Ok(removed)
    }
}

/// Cosine similarity of two equal-length vectors; 0.0 if either has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(name: &str) -> Owner {
        Owner::new(name).unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_query_is_scoped_and_ordered() {
        let backend = InMemoryBackend::new(Some(2));
        let u1 = owner("u1");
        let u2 = owner("u2");

        backend.insert(MemoryRecord::new(&u1, "east", vec![1.0, 0.0])).await.unwrap();
        backend.insert(MemoryRecord::new(&u1, "north-east", vec![1.0, 1.0])).await.unwrap();
        backend.insert(MemoryRecord::new(&u2, "east too", vec![1.0, 0.0])).await.unwrap();

        let hits = backend.query(&[1.0, 0.0], 10, &u1).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.content, "east");
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.entry.owner == "u1"));

        let hits = backend.query(&[1.0, 0.0], 1, &u1).await.unwrap();
        assert_eq!(hits.len(), 1);

        assert!(backend.query(&[1.0, 0.0], 5, &owner("nobody")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_equal_scores_prefer_newer() {
        let backend = InMemoryBackend::new(Some(2));
        let u1 = owner("u1");
        let older = MemoryRecord::new(&u1, "same", vec![1.0, 0.0]);
        let newer = MemoryRecord::new(&u1, "same", vec![1.0, 0.0]);
        backend.insert(older).await.unwrap();
        backend.insert(newer.clone()).await.unwrap();

        let hits = backend.query(&[1.0, 0.0], 1, &u1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.id, newer.id);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let backend = InMemoryBackend::new(None);
        let u1 = owner("u1");
        backend.insert(MemoryRecord::new(&u1, "a", vec![1.0, 0.0, 0.0])).await.unwrap();

        let err = backend
            .insert(MemoryRecord::new(&u1, "b", vec![1.0, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(backend.query(&[1.0], 3, &u1).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let backend = InMemoryBackend::new(None);
        let record = MemoryRecord::new(&owner("u1"), "a", vec![1.0]);
        backend.insert(record.clone()).await.unwrap();
        assert!(backend.insert(record).await.is_err());
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_is_owner_scoped() {
        let backend = InMemoryBackend::new(None);
        let u1 = owner("u1");
        let record = MemoryRecord::new(&u1, "a", vec![1.0]);
        let id = record.id.clone();
        backend.insert(record).await.unwrap();

        assert!(!backend.delete(&owner("u2"), &id).await.unwrap());
        assert_eq!(backend.list(&u1).await.unwrap().len(), 1);

        assert!(backend.delete(&u1, &id).await.unwrap());
        assert!(backend.is_empty().await);
    }
}
