//! Memory records and their identifiers

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::owner::Owner;

/// A stored memory as written to a backend. Immutable once stored.
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    /// Globally unique key, prefixed with the owner
    pub id: String,

    /// Owner identity, set once at store time
    pub owner: String,

    /// Opaque text payload
    pub content: String,

    /// Embedding of `content`
    pub embedding: Vec<f32>,

    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a new record for `owner`, generating its id and timestamp
    pub fn new(owner: &Owner, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        let created_at = now();
        Self {
            id: generate_id(owner, created_at),
            owner: owner.as_str().to_string(),
            content: content.into(),
            embedding,
            created_at,
        }
    }

    /// Read view of this record, without the vector
    pub fn entry(&self) -> MemoryEntry {
        MemoryEntry {
            id: self.id.clone(),
            owner: self.owner.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

/// A record as returned by `list` and `retrieve`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub owner: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// An entry paired with its similarity to a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: MemoryEntry,
    pub score: f32,
}

static LAST_MICROS: AtomicI64 = AtomicI64::new(0);

/// Current time at microsecond precision. Successive calls in one process
/// always return later values, so creation order is total.
pub fn now() -> DateTime<Utc> {
    let wall = Utc::now().timestamp_micros();
    let previous = LAST_MICROS
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(wall.max(last + 1))
        })
        .unwrap_or(wall);
    from_micros(wall.max(previous + 1))
}

/// Convert stored microseconds back into a timestamp
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// `{owner}_{YYYYMMDD_HHMMSS_ffffff}_{8 hex}`
fn generate_id(owner: &Owner, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        owner.as_str(),
        at.format("%Y%m%d_%H%M%S_%6f"),
        &suffix[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_and_owner_prefixed() {
        let owner = Owner::new("u1").unwrap();
        let ids: HashSet<String> = (0..500)
            .map(|_| MemoryRecord::new(&owner, "same content", vec![1.0]).id)
            .collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.starts_with("u1_")));
    }

    #[test]
    fn test_clock_is_increasing() {
        let mut last = now();
        for _ in 0..1000 {
            let next = now();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_micros_round_trip() {
        let at = now();
        assert_eq!(from_micros(at.timestamp_micros()), at);
    }
}
