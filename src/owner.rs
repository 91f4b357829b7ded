//! Owner identity and the isolation guard around every backend call.
//!
//! Backends only ever receive an [`Owner`], never a raw string, so every read
//! carries an owner filter by construction. [`GuardedBackend`] additionally
//! checks what comes back and fails the call if a foreign record shows up.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::error::{bounded, Error, Result};
use crate::record::{MemoryEntry, MemoryRecord, ScoredEntry};
use crate::storage::{Consistency, VectorBackend};

/// A validated, non-empty owner identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner(String);

impl Owner {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(Error::authorization("user_id is required"));
        }
        Ok(Self(raw))
    }

    /// Validate an owner that may be missing from a request
    pub fn from_optional(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some(raw) => Self::new(raw),
            None => Err(Error::authorization("user_id is required")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `owner` names this identity
    pub fn owns(&self, owner: &str) -> bool {
        self.0 == owner
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner-enforcing, time-bounded wrapper over a [`VectorBackend`]
#[derive(Clone)]
pub struct GuardedBackend {
    inner: Arc<dyn VectorBackend>,
    timeout: Duration,
}

impl GuardedBackend {
    pub fn new(inner: Arc<dyn VectorBackend>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn consistency(&self) -> Consistency {
        self.inner.consistency()
    }

    pub async fn insert(&self, owner: &Owner, record: MemoryRecord) -> Result<()> {
        if !owner.owns(&record.owner) {
            return Err(Error::authorization(format!(
                "record {} is not owned by the requesting user",
                record.id
            )));
        }
        bounded("backend insert", self.timeout, self.inner.insert(record)).await
    }

    pub async fn query(
        &self,
        owner: &Owner,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredEntry>> {
        let hits = bounded(
            "backend query",
            self.timeout,
            self.inner.query(vector, top_k, owner),
        )
        .await?;
        self.ensure_owned(owner, hits.iter().map(|hit| &hit.entry))?;
        Ok(hits)
    }

    pub async fn list(&self, owner: &Owner) -> Result<Vec<MemoryEntry>> {
        let entries = bounded("backend list", self.timeout, self.inner.list(owner)).await?;
        self.ensure_owned(owner, entries.iter())?;
        Ok(entries)
    }

    pub async fn delete(&self, owner: &Owner, id: &str) -> Result<bool> {
        bounded("backend delete", self.timeout, self.inner.delete(owner, id)).await
    }

    fn ensure_owned<'a>(
        &self,
        owner: &Owner,
        mut entries: impl Iterator<Item = &'a MemoryEntry>,
    ) -> Result<()> {
        match entries.find(|entry| !owner.owns(&entry.owner)) {
            None => Ok(()),
            Some(foreign) => {
                error!(
                    backend = self.inner.name(),
                    record = %foreign.id,
                    "backend returned a record outside the requested owner filter"
                );
                Err(Error::authorization(
                    "backend returned records belonging to another user",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryBackend;
    use async_trait::async_trait;

    /// Backend that ignores the owner filter
    struct LeakyBackend {
        entry: MemoryEntry,
    }

    #[async_trait]
    impl VectorBackend for LeakyBackend {
        fn name(&self) -> &'static str {
            "leaky"
        }

        fn consistency(&self) -> Consistency {
            Consistency::Immediate
        }

        async fn insert(&self, _record: MemoryRecord) -> Result<()> {
            Ok(())
        }

        async fn query(&self, _: &[f32], _: usize, _: &Owner) -> Result<Vec<ScoredEntry>> {
            Ok(vec![ScoredEntry {
                entry: self.entry.clone(),
                score: 1.0,
            }])
        }

        async fn list(&self, _: &Owner) -> Result<Vec<MemoryEntry>> {
            Ok(vec![self.entry.clone()])
        }
    }

    #[test]
    fn test_owner_rejects_blank() {
        assert!(matches!(Owner::new(""), Err(Error::Authorization(_))));
        assert!(matches!(Owner::new("   "), Err(Error::Authorization(_))));
        assert!(matches!(Owner::from_optional(None), Err(Error::Authorization(_))));
        assert_eq!(Owner::new("u1").unwrap().as_str(), "u1");
    }

    #[tokio::test]
    async fn test_insert_for_other_owner_is_rejected() {
        let guard = GuardedBackend::new(Arc::new(InMemoryBackend::new(None)), Duration::from_secs(1));
        let u1 = Owner::new("u1").unwrap();
        let u2 = Owner::new("u2").unwrap();
        let record = MemoryRecord::new(&u1, "hello", vec![1.0, 0.0]);

        let err = guard.insert(&u2, record).await.unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }

    #[tokio::test]
    async fn test_leaked_records_fail_the_call() {
        let u1 = Owner::new("u1").unwrap();
        let u2 = Owner::new("u2").unwrap();
        let leaked = MemoryRecord::new(&u1, "secret", vec![1.0]).entry();
        let guard = GuardedBackend::new(
            Arc::new(LeakyBackend { entry: leaked }),
            Duration::from_secs(1),
        );

        assert!(matches!(guard.list(&u2).await, Err(Error::Authorization(_))));
        assert!(matches!(
            guard.query(&u2, &[1.0], 5).await,
            Err(Error::Authorization(_))
        ));
        // The rightful owner still reads normally
        assert_eq!(guard.list(&u1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_delete_surfaces() {
        let leaky = LeakyBackend {
            entry: MemoryRecord::new(&Owner::new("u1").unwrap(), "x", vec![1.0]).entry(),
        };
        let guard = GuardedBackend::new(Arc::new(leaky), Duration::from_secs(1));
        let err = guard.delete(&Owner::new("u1").unwrap(), "id").await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
