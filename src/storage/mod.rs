//! Storage backends for vector-memory
//!
//! Every backend scores with cosine similarity, so scores fall in `[-1, 1]`
//! and are comparable across variants up to the backend's numeric precision.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendKind, Config};
use crate::error::{Error, Result};
use crate::owner::Owner;
use crate::record::{MemoryEntry, MemoryRecord, ScoredEntry};

pub mod lance;
pub mod memory;
pub mod qdrant;

pub use lance::LanceBackend;
pub use memory::InMemoryBackend;
pub use qdrant::QdrantBackend;

/// Similarity metric a backend scores with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityMetric {
    /// Cosine similarity, range `[-1, 1]`
    Cosine,
}

impl SimilarityMetric {
    pub fn range(&self) -> (f32, f32) {
        match self {
            SimilarityMetric::Cosine => (-1.0, 1.0),
        }
    }
}

/// Read-after-write guarantee of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// A stored record is visible to the next read
    Immediate,
    /// A stored record becomes visible after a settle interval
    Eventual,
}

/// Storage capability set shared by all backends.
///
/// Reads take an [`Owner`] and must apply it inside the backend call; a
/// backend never returns records of another owner.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn metric(&self) -> SimilarityMetric {
        SimilarityMetric::Cosine
    }

    fn consistency(&self) -> Consistency;

    /// Append a record. Records are never updated in place.
    async fn insert(&self, record: MemoryRecord) -> Result<()>;

    /// Nearest `top_k` records of `owner` to `vector`, best first.
    ///
    /// Returning fewer than `top_k` hits means the owner has no more records.
    async fn query(&self, vector: &[f32], top_k: usize, owner: &Owner)
        -> Result<Vec<ScoredEntry>>;

    /// Every record of `owner`, in no particular order
    async fn list(&self, owner: &Owner) -> Result<Vec<MemoryEntry>>;

    /// Remove one record of `owner`. Returns whether it existed.
    async fn delete(&self, _owner: &Owner, _id: &str) -> Result<bool> {
        Err(Error::unsupported(format!(
            "{} backend does not support deletion",
            self.name()
        )))
    }
}

/// Build the backend selected by `config.backend`
pub async fn create_backend(config: &Config) -> Result<Arc<dyn VectorBackend>> {
    let backend: Arc<dyn VectorBackend> = match config.backend {
        BackendKind::Memory => Arc::new(InMemoryBackend::new(Some(config.embedding.dimensions))),
        BackendKind::Lance => Arc::new(LanceBackend::new(config).await?),
        BackendKind::Qdrant => Arc::new(QdrantBackend::new(config).await?),
    };
    Ok(backend)
}

/// Reject vectors of the wrong dimension before they reach the index
pub(crate) fn check_dimensions(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::invalid_input(format!(
            "Embedding dimension mismatch: expected {}, got {}",
            expected, actual
        )));
    }
    Ok(())
}

/// Best-first order: higher score, then newer `created_at`, then larger id
pub(crate) fn best_first(a: &ScoredEntry, b: &ScoredEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.entry.created_at.cmp(&a.entry.created_at))
        .then_with(|| b.entry.id.cmp(&a.entry.id))
}

/// Quote a string literal for a SQL-style filter predicate
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
