//! Vector storage using LanceDB for on-disk semantic search

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lance_arrow::FixedSizeListArrayExt;
use lancedb::connect;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;
use tracing::{debug, info};

use super::{best_first, check_dimensions, sql_literal, Consistency, VectorBackend};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::owner::Owner;
use crate::record::{from_micros, MemoryEntry, MemoryRecord, ScoredEntry};

/// Vector storage backend using LanceDB
pub struct LanceBackend {
    db: lancedb::Connection,
    table_name: String,
    dimensions: usize,
}

impl LanceBackend {
    /// Open (or create) the memories table under the configured data dir
    pub async fn new(config: &Config) -> Result<Self> {
        config.ensure_dirs()?;

        let path = config.lance_path();
        let uri = path
            .to_str()
            .ok_or_else(|| Error::config(format!("Data path is not valid UTF-8: {:?}", path)))?;

        let db = connect(uri)
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        let storage = Self {
            db,
            table_name: config.index_name.clone(),
            dimensions: config.embedding.dimensions,
        };

        storage.ensure_table().await?;
        debug!("Opened LanceDB table {} at {}", storage.table_name, uri);

        Ok(storage)
    }

    /// Get the schema for the memories table
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("owner", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("created_at", DataType::Int64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimensions as i32,
                ),
                false,
            ),
        ])
    }

    async fn ensure_table(&self) -> Result<()> {
        let tables = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        if !tables.contains(&self.table_name) {
            info!("Creating LanceDB table: {}", self.table_name);

            let schema = Arc::new(self.schema());
            let empty_batch = RecordBatch::new_empty(schema.clone());
            let reader = RecordBatchIterator::new(vec![empty_batch].into_iter().map(Ok), schema);

            self.db
                .create_table(&self.table_name, Box::new(reader))
                .execute()
                .await
                .map_err(|e| Error::backend(e.to_string()))?;
        }

        Ok(())
    }

    async fn table(&self) -> Result<lancedb::Table> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))
    }

    fn owner_filter(owner: &Owner) -> String {
        format!("owner = {}", sql_literal(owner.as_str()))
    }
}

#[async_trait]
impl VectorBackend for LanceBackend {
    fn name(&self) -> &'static str {
        "lance"
    }

    fn consistency(&self) -> Consistency {
        Consistency::Immediate
    }

    async fn insert(&self, record: MemoryRecord) -> Result<()> {
        check_dimensions(self.dimensions, record.embedding.len())?;

        let values = Float32Array::from(record.embedding.clone());
        let vector_array = FixedSizeListArray::try_new_from_values(values, self.dimensions as i32)
            .map_err(|e: arrow_schema::ArrowError| Error::backend(e.to_string()))?;

        let schema = Arc::new(self.schema());
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![record.id.clone()])) as Arc<dyn Array>,
                Arc::new(StringArray::from(vec![record.owner.clone()])),
                Arc::new(StringArray::from(vec![record.content.clone()])),
                Arc::new(Int64Array::from(vec![record.created_at.timestamp_micros()])),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| Error::backend(e.to_string()))?;

        let reader = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);

        self.table()
            .await?
            .add(Box::new(reader))
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        debug!("Inserted memory {} into LanceDB", record.id);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        owner: &Owner,
    ) -> Result<Vec<ScoredEntry>> {
        check_dimensions(self.dimensions, vector.len())?;

        let stream = self
            .table()
            .await?
            .vector_search(vector.to_vec())
            .map_err(|e| Error::backend(e.to_string()))?
            .distance_type(DistanceType::Cosine)
            .only_if(Self::owner_filter(owner))
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e: lancedb::Error| Error::backend(e.to_string()))?;

        let mut hits = Vec::new();
        for batch in &batches {
            let entries = entries_from_batch(batch)?;
            let distances = float_column(batch, "_distance")?;
            for (i, entry) in entries.into_iter().enumerate() {
                // Cosine distance is 1 - cosine similarity
                let score = (1.0 - distances.value(i)).clamp(-1.0, 1.0);
                hits.push(ScoredEntry { entry, score });
            }
        }

        hits.sort_by(best_first);
        Ok(hits)
    }

    async fn list(&self, owner: &Owner) -> Result<Vec<MemoryEntry>> {
        let table = self.table().await?;
        let filter = Self::owner_filter(owner);

        let count = table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(|e| Error::backend(e.to_string()))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let stream = table
            .query()
            .only_if(filter)
            .limit(count)
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e: lancedb::Error| Error::backend(e.to_string()))?;

        let mut entries = Vec::with_capacity(count);
        for batch in &batches {
            entries.extend(entries_from_batch(batch)?);
        }
        Ok(entries)
    }

    async fn delete(&self, owner: &Owner, id: &str) -> Result<bool> {
        let table = self.table().await?;
        let predicate = format!("{} AND id = {}", Self::owner_filter(owner), sql_literal(id));

        let existing = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| Error::backend(e.to_string()))?;
        if existing == 0 {
            return Ok(false);
        }

        table
            .delete(&predicate)
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        Ok(true)
    }
}

fn entries_from_batch(batch: &RecordBatch) -> Result<Vec<MemoryEntry>> {
    let ids = string_column(batch, "id")?;
    let owners = string_column(batch, "owner")?;
    let contents = string_column(batch, "content")?;
    let created = batch
        .column_by_name("created_at")
        .ok_or_else(|| Error::backend("Missing created_at column"))?
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| Error::backend("created_at column is not Int64Array"))?;

    Ok((0..batch.num_rows())
        .map(|i| MemoryEntry {
            id: ids.value(i).to_string(),
            owner: owners.value(i).to_string(),
            content: contents.value(i).to_string(),
            created_at: from_micros(created.value(i)),
        })
        .collect())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::backend(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::backend(format!("{} column is not StringArray", name)))
}

fn float_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::backend(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| Error::backend(format!("{} column is not Float32Array", name)))
}
