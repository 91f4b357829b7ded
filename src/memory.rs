//! Record creation and enumeration

use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::owner::{GuardedBackend, Owner};
use crate::record::{MemoryEntry, MemoryRecord};

/// Owns record creation: embedding, id generation, owner tagging and the
/// backend write. Nothing is retried here; the caller decides.
#[derive(Clone)]
pub struct RecordManager {
    embedder: Embedder,
    backend: GuardedBackend,
}

impl RecordManager {
    pub fn new(embedder: Embedder, backend: GuardedBackend) -> Self {
        Self { embedder, backend }
    }

    /// Embed `content` and store it for `owner`, returning the new record id
    pub async fn store(&self, owner: &Owner, content: &str) -> Result<String> {
        if content.trim().is_empty() {
            return Err(Error::invalid_input("content is required"));
        }

        let embedding = self.embedder.embed(content).await?;
        let record = MemoryRecord::new(owner, content, embedding);
        let id = record.id.clone();

        self.backend.insert(owner, record).await?;

        info!(
            "Stored memory {} for user {} ({} backend)",
            id,
            owner,
            self.backend.name()
        );
        Ok(id)
    }

    /// Every record stored for `owner`, in no particular order
    pub async fn list(&self, owner: &Owner) -> Result<Vec<MemoryEntry>> {
        let entries = self.backend.list(owner).await?;
        debug!("Listed {} memories for user {}", entries.len(), owner);
        Ok(entries)
    }

    /// Delete one record of `owner`, where the backend supports it
    pub async fn delete(&self, owner: &Owner, id: &str) -> Result<bool> {
        if id.trim().is_empty() {
            return Err(Error::invalid_input("id is required"));
        }
        let removed = self.backend.delete(owner, id).await?;
        if removed {
            info!("Deleted memory {} for user {}", id, owner);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::storage::InMemoryBackend;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn manager() -> RecordManager {
        let timeout = Duration::from_secs(1);
        RecordManager::new(
            Embedder::new(Arc::new(HashingEmbedder::new(64)), 8000, timeout),
            GuardedBackend::new(Arc::new(InMemoryBackend::new(Some(64))), timeout),
        )
    }

    #[tokio::test]
    async fn test_store_then_list() {
        let manager = manager();
        let u1 = Owner::new("u1").unwrap();

        let id = assert_ok!(manager.store(&u1, "remember the milk").await);
        let listed = manager.list(&u1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].owner, "u1");
        assert_eq!(listed[0].content, "remember the milk");
    }

    #[tokio::test]
    async fn test_identical_content_gets_distinct_ids() {
        let manager = manager();
        let u1 = Owner::new("u1").unwrap();

        let a = manager.store(&u1, "same").await.unwrap();
        let b = manager.store(&u1, "same").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.list(&u1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let manager = manager();
        let u1 = Owner::new("u1").unwrap();
        let err = assert_err!(manager.store(&u1, "  ").await);
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(manager.list(&u1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let manager = manager();
        let u1 = Owner::new("u1").unwrap();
        let id = manager.store(&u1, "temporary").await.unwrap();

        assert!(manager.delete(&u1, &id).await.unwrap());
        assert!(!manager.delete(&u1, &id).await.unwrap());
        assert!(manager.list(&u1).await.unwrap().is_empty());
    }
}
