//! Remote vector storage backed by a Qdrant collection.
//!
//! Unless `wait_for_writes` is set, upserts return before the point is
//! indexed, so a `retrieve` issued right after a `store` may not see it yet.
//! Callers needing read-after-write must allow a settle interval.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    points_selector::PointsSelectorOneOf, Condition, CountPointsBuilder,
    CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{check_dimensions, Consistency, VectorBackend};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::owner::Owner;
use crate::record::{from_micros, MemoryEntry, MemoryRecord, ScoredEntry};

const OWNER_KEY: &str = "user_id";
const KEY_KEY: &str = "memory_key";
const CONTENT_KEY: &str = "content";
const CREATED_KEY: &str = "created_at";
const TIMESTAMP_KEY: &str = "timestamp";

/// Points fetched per scroll page when listing
const SCROLL_PAGE: u32 = 256;

/// Memory store backed by a remote Qdrant collection
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    dimensions: usize,
    wait_for_writes: bool,
}

impl QdrantBackend {
    /// Connect to Qdrant and make sure the collection exists
    pub async fn new(config: &Config) -> Result<Self> {
        let url = config
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::config("qdrant backend requires an endpoint"))?;

        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .api_key(config.api_key.clone())
            .timeout(config.operation_timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to create Qdrant client: {}", e)))?;

        let store = Self {
            client,
            collection: config.index_name.clone(),
            dimensions: config.embedding.dimensions,
            wait_for_writes: config.wait_for_writes,
        };

        store.ensure_collection().await?;

        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| Error::backend(format!("Failed to check collection existence: {}", e)))?;

        if !exists {
            info!("Creating collection: {}", self.collection);

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimensions as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| Error::backend(format!("Failed to create collection: {}", e)))?;
        } else {
            debug!("Collection {} already exists", self.collection);
        }

        Ok(())
    }

    fn owner_filter(owner: &Owner) -> Filter {
        Filter::must([Condition::matches(OWNER_KEY, owner.as_str().to_string())])
    }

    /// Qdrant only accepts UUID or integer point ids; derive one from the key
    fn point_id(key: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    fn consistency(&self) -> Consistency {
        if self.wait_for_writes {
            Consistency::Immediate
        } else {
            Consistency::Eventual
        }
    }

    async fn insert(&self, record: MemoryRecord) -> Result<()> {
        check_dimensions(self.dimensions, record.embedding.len())?;

        let payload: HashMap<String, Value> = [
            (KEY_KEY.to_string(), Value::from(record.id.clone())),
            (OWNER_KEY.to_string(), Value::from(record.owner.clone())),
            (CONTENT_KEY.to_string(), Value::from(record.content.clone())),
            (
                CREATED_KEY.to_string(),
                Value::from(record.created_at.timestamp_micros()),
            ),
            (
                TIMESTAMP_KEY.to_string(),
                Value::from(record.created_at.to_rfc3339()),
            ),
        ]
        .into_iter()
        .collect();

        let point = PointStruct::new(Self::point_id(&record.id), record.embedding, payload);

        self.client
            .upsert_points(
                UpsertPointsBuilder::new(&self.collection, vec![point]).wait(self.wait_for_writes),
            )
            .await
            .map_err(|e| Error::backend(format!("Failed to upsert memory: {}", e)))?;

        debug!("Memory {} sent to Qdrant", record.id);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        owner: &Owner,
    ) -> Result<Vec<ScoredEntry>> {
        check_dimensions(self.dimensions, vector.len())?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                    .filter(Self::owner_filter(owner))
                    .with_payload(true),
            )
            .await
            .map_err(|e| Error::backend(format!("Failed to search memories: {}", e)))?;

        response
            .result
            .into_iter()
            .map(|point| {
                let score = point.score;
                entry_from_payload(&point.payload).map(|entry| ScoredEntry { entry, score })
            })
            .collect()
    }

    async fn list(&self, owner: &Owner) -> Result<Vec<MemoryEntry>> {
        let mut entries = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut request = ScrollPointsBuilder::new(&self.collection)
                .filter(Self::owner_filter(owner))
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(start) = offset.take() {
                request = request.offset(start);
            }

            let page = self
                .client
                .scroll(request)
                .await
                .map_err(|e| Error::backend(format!("Failed to scroll memories: {}", e)))?;

            for point in &page.result {
                entries.push(entry_from_payload(&point.payload)?);
            }

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!("Listed {} memories for user {}", entries.len(), owner);
        Ok(entries)
    }

    async fn delete(&self, owner: &Owner, id: &str) -> Result<bool> {
        let filter = Filter::must([
            Condition::matches(OWNER_KEY, owner.as_str().to_string()),
            Condition::matches(KEY_KEY, id.to_string()),
        ]);

        let existing = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(filter.clone())
                    .exact(true),
            )
            .await
            .map_err(|e| Error::backend(format!("Failed to count memories: {}", e)))?
            .result
            .map(|r| r.count)
            .unwrap_or(0);
        if existing == 0 {
            return Ok(false);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsSelectorOneOf::Filter(filter))
                    .wait(self.wait_for_writes),
            )
            .await
            .map_err(|e| Error::backend(format!("Failed to delete memory: {}", e)))?;

        Ok(true)
    }
}

/// Decode a stored point. A point missing any memory field fails the read,
/// since dropping it would make `list` incomplete.
fn entry_from_payload(payload: &HashMap<String, Value>) -> Result<MemoryEntry> {
    let created_at = payload
        .get(CREATED_KEY)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| malformed(payload, CREATED_KEY))?;

    Ok(MemoryEntry {
        id: get_string(payload, KEY_KEY)?,
        owner: get_string(payload, OWNER_KEY)?,
        content: get_string(payload, CONTENT_KEY)?,
        created_at: from_micros(created_at),
    })
}

fn get_string(payload: &HashMap<String, Value>, key: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| malformed(payload, key))
}

fn malformed(payload: &HashMap<String, Value>, key: &str) -> Error {
    let point = payload
        .get(KEY_KEY)
        .and_then(|v| v.as_str())
        .map(|s| s.as_str())
        .unwrap_or("<unknown>");
    warn!(point, field = key, "Qdrant point has an incomplete memory payload");
    Error::backend(format!(
        "Qdrant point {} is missing payload field {}",
        point, key
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;

    #[test]
    fn test_point_id_is_stable_uuid() {
        let a = QdrantBackend::point_id("u1_20250101_000000_000000_abcd1234");
        let b = QdrantBackend::point_id("u1_20250101_000000_000000_abcd1234");
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_ne!(a, QdrantBackend::point_id("u2_20250101_000000_000000_abcd1234"));
    }

    #[test]
    fn test_payload_round_trip() {
        let record = MemoryRecord::new(&Owner::new("u1").unwrap(), "hello", vec![]);
        let payload: HashMap<String, Value> = [
            (KEY_KEY.to_string(), Value::from(record.id.clone())),
            (OWNER_KEY.to_string(), Value::from("u1".to_string())),
            (CONTENT_KEY.to_string(), Value::from("hello".to_string())),
            (
                CREATED_KEY.to_string(),
                Value::from(record.created_at.timestamp_micros()),
            ),
        ]
        .into_iter()
        .collect();

        assert_eq!(entry_from_payload(&payload).unwrap(), record.entry());

        let mut partial = payload.clone();
        partial.remove(OWNER_KEY);
        let err = entry_from_payload(&partial).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(err.to_string().contains(&record.id));
    }

    // Requires a running Qdrant instance at localhost:6334
    #[tokio::test]
    #[ignore]
    async fn test_store_and_search() {
        let mut config = Config::default();
        config.backend = BackendKind::Qdrant;
        config.endpoint = Some("http://localhost:6334".to_string());
        config.index_name = "vector_memory_test".to_string();
        config.embedding.dimensions = 4;
        config.wait_for_writes = true;

        let store = QdrantBackend::new(&config).await.unwrap();
        let owner = Owner::new("test_user").unwrap();
        let record = MemoryRecord::new(&owner, "Test memory content", vec![0.1, 0.2, 0.3, 0.4]);
        let id = record.id.clone();
        store.insert(record).await.unwrap();

        let results = store.query(&[0.1, 0.2, 0.3, 0.4], 10, &owner).await.unwrap();
        assert!(results.iter().any(|r| r.entry.id == id));

        assert!(store.delete(&owner, &id).await.unwrap());
    }
}
