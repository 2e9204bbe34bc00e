use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::index::Index;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::memory::cold::ColdBackend;
use crate::memory::types::ColdRecord;
use crate::storage::filter::RecordFilter;

const CONTENT_EMBEDDING: &str = "content_embedding";
const RESPONSE_EMBEDDING: &str = "response_embedding";

/// IVF-PQ training needs at least this many rows
const MIN_INDEX_ROWS: usize = 256;

pub struct LanceColdBackend {
    connection: Connection,
    table: Table,
    dimension: i32,
}

impl LanceColdBackend {
    /// Open `table_name` under `path`, creating it when absent
    ///
    /// An existing table whose embedding width differs from `dimension` is refused.
    pub async fn connect(path: &Path, table_name: &str, dimension: usize) -> Result<Self> {
        let dimension = i32::try_from(dimension)
            .map_err(|_| MemoryError::Config(format!("Embedding dimension {dimension} too large")))?;
        let uri = path
            .to_str()
            .ok_or_else(|| MemoryError::Persistence("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| MemoryError::Persistence(format!("Failed to connect to LanceDB: {e}")))?;

        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| MemoryError::Persistence(format!("Failed to list tables: {e}")))?;

        let table = if names.iter().any(|n| n == table_name) {
            let table = connection
                .open_table(table_name)
                .execute()
                .await
                .map_err(|e| MemoryError::Persistence(format!("Failed to open table: {e}")))?;
            Self::check_dimension(&table, dimension).await?;
            table
        } else {
            let schema = Self::schema(dimension);
            let batches = RecordBatchIterator::new(
                vec![Ok(RecordBatch::new_empty(schema.clone()))],
                schema,
            );
            info!("Creating cold table '{table_name}' with dimension {dimension}");
            connection
                .create_table(table_name, Box::new(batches))
                .execute()
                .await
                .map_err(|e| MemoryError::Persistence(format!("Failed to create table: {e}")))?
        };

        Ok(Self {
            connection,
            table,
            dimension,
        })
    }

    fn schema(dimension: i32) -> Arc<Schema> {
        let embedding = || {
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            )
        };

        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("conversation_key", DataType::Utf8, false),
            Field::new("actor_id", DataType::Utf8, false),
            Field::new("original_content", DataType::Utf8, false),
            Field::new("processed_content", DataType::Utf8, false),
            Field::new("selected_agent", DataType::Utf8, false),
            Field::new("agent_response", DataType::Utf8, false),
            Field::new("confidence", DataType::Float32, false),
            Field::new(CONTENT_EMBEDDING, embedding(), false),
            Field::new(RESPONSE_EMBEDDING, embedding(), false),
            Field::new("context_blob", DataType::Utf8, false),
            Field::new("importance_score", DataType::Float32, false),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
        ]))
    }

    async fn check_dimension(table: &Table, expected: i32) -> Result<()> {
        let schema = table
            .schema()
            .await
            .map_err(|e| MemoryError::Persistence(format!("Failed to read schema: {e}")))?;
        let field = schema
            .field_with_name(CONTENT_EMBEDDING)
            .map_err(|e| MemoryError::Persistence(format!("Unexpected table layout: {e}")))?;

        match field.data_type() {
            DataType::FixedSizeList(_, size) if *size == expected => Ok(()),
            DataType::FixedSizeList(_, size) => Err(MemoryError::Config(format!(
                "Cold table stores {size}-dimension embeddings, configured dimension is {expected}"
            ))),
            other => Err(MemoryError::Persistence(format!(
                "Unexpected {CONTENT_EMBEDDING} type: {other}"
            ))),
        }
    }

    /// Build an IVF-PQ index over `content_embedding` once the table is large enough
    ///
    /// Returns `true` when an index was created. Small tables are searched exactly.
    pub async fn ensure_index(&self) -> Result<bool> {
        let rows = self
            .table
            .count_rows(None)
            .await
            .map_err(|e| MemoryError::Persistence(format!("Failed to count rows: {e}")))?;
        if rows < MIN_INDEX_ROWS {
            return Ok(false);
        }

        let indices = self
            .table
            .list_indices()
            .await
            .map_err(|e| MemoryError::Persistence(format!("Failed to list indices: {e}")))?;
        if indices
            .iter()
            .any(|idx| idx.columns.iter().any(|c| c == CONTENT_EMBEDDING))
        {
            return Ok(false);
        }

        let partitions = ((rows as f64).sqrt() as u32).clamp(1, 256);
        let sub_vectors = [16, 8, 4, 2, 1]
            .into_iter()
            .find(|n| self.dimension % n == 0)
            .unwrap_or(1) as u32;

        let ivf_pq = IvfPqIndexBuilder::default()
            .distance_type(DistanceType::Cosine)
            .num_partitions(partitions)
            .num_sub_vectors(sub_vectors);

        self.table
            .create_index(&[CONTENT_EMBEDDING], Index::IvfPq(ivf_pq))
            .execute()
            .await
            .map_err(|e| MemoryError::Persistence(format!("Failed to create vector index: {e}")))?;

        info!(rows, partitions, sub_vectors, "Created cold vector index");
        Ok(true)
    }

    /// Convert records to an Arrow RecordBatch
    fn records_to_batch(records: &[ColdRecord], dimension: i32) -> Result<RecordBatch> {
        let ids: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let confidences: Vec<f32> = records.iter().map(|r| r.confidence).collect();
        let importance: Vec<f32> = records.iter().map(|r| r.importance_score).collect();
        let created_at: Vec<i64> = records
            .iter()
            .map(|r| r.created_at.timestamp_micros())
            .collect();

        RecordBatch::try_new(
            Self::schema(dimension),
            vec![
                Arc::new(StringArray::from(id_refs)),
                Arc::new(string_array(records, |r| r.conversation_key.as_str())),
                Arc::new(string_array(records, |r| r.actor_id.as_str())),
                Arc::new(string_array(records, |r| r.original_content.as_str())),
                Arc::new(string_array(records, |r| r.processed_content.as_str())),
                Arc::new(string_array(records, |r| r.selected_agent.as_str())),
                Arc::new(string_array(records, |r| r.agent_response.as_str())),
                Arc::new(Float32Array::from(confidences)),
                Arc::new(embedding_array(records, dimension, |r| {
                    r.content_embedding.as_slice()
                })),
                Arc::new(embedding_array(records, dimension, |r| {
                    r.response_embedding.as_slice()
                })),
                Arc::new(string_array(records, |r| r.context_blob.as_str())),
                Arc::new(Float32Array::from(importance)),
                Arc::new(TimestampMicrosecondArray::from(created_at).with_timezone("UTC")),
            ],
        )
        .map_err(|e| MemoryError::Persistence(format!("Failed to create RecordBatch: {e}")))
    }

    /// Convert an Arrow RecordBatch row back to a record
    ///
    /// Columns are looked up by name: search results carry an extra `_distance` column.
    fn batch_to_record(batch: &RecordBatch, row: usize) -> Result<ColdRecord> {
        let text = |name: &str| -> Result<String> {
            Ok(column::<StringArray>(batch, name)?.value(row).to_string())
        };
        let float = |name: &str| -> Result<f32> { Ok(column::<Float32Array>(batch, name)?.value(row)) };
        let vector = |name: &str| -> Result<Vec<f32>> {
            let list = column::<FixedSizeListArray>(batch, name)?.value(row);
            let values = list
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| MemoryError::Persistence(format!("Failed to read {name} values")))?;
            Ok(values.values().to_vec())
        };

        let id = Uuid::parse_str(&text("id")?)
            .map_err(|e| MemoryError::Persistence(format!("Failed to parse UUID: {e}")))?;
        let created_micros = column::<TimestampMicrosecondArray>(batch, "created_at")?.value(row);
        let created_at = Utc
            .timestamp_micros(created_micros)
            .single()
            .ok_or_else(|| MemoryError::Persistence("Failed to parse created_at".to_string()))?;

        Ok(ColdRecord {
            id,
            conversation_key: text("conversation_key")?,
            actor_id: text("actor_id")?,
            original_content: text("original_content")?,
            processed_content: text("processed_content")?,
            selected_agent: text("selected_agent")?,
            agent_response: text("agent_response")?,
            confidence: float("confidence")?,
            content_embedding: vector(CONTENT_EMBEDDING)?,
            response_embedding: vector(RESPONSE_EMBEDDING)?,
            context_blob: text("context_blob")?,
            importance_score: float("importance_score")?,
            created_at,
        })
    }
}

fn string_array<'a>(
    records: &'a [ColdRecord],
    field: impl Fn(&'a ColdRecord) -> &'a str,
) -> StringArray {
    StringArray::from(records.iter().map(field).collect::<Vec<&str>>())
}

fn embedding_array<'a>(
    records: &'a [ColdRecord],
    dimension: i32,
    field: impl Fn(&'a ColdRecord) -> &'a [f32],
) -> FixedSizeListArray {
    FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
        records
            .iter()
            .map(|r| Some(field(r).iter().map(|&v| Some(v)).collect::<Vec<_>>())),
        dimension,
    )
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| MemoryError::Persistence(format!("Failed to get {name} column")))
}

#[async_trait]
impl ColdBackend for LanceColdBackend {
    async fn insert(&self, record: &ColdRecord) -> Result<()> {
        let batch = Self::records_to_batch(std::slice::from_ref(record), self.dimension)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| MemoryError::Persistence(format!("Failed to insert record: {e}")))?;
        Ok(())
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<ColdRecord>> {
        if self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let mut query = self
            .table
            .query()
            .nearest_to(embedding)
            .map_err(|e| MemoryError::Persistence(format!("Failed to create vector query: {e}")))?
            .column(CONTENT_EMBEDDING)
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(sql_filter) = filter.to_sql_clause() {
            query = query.only_if(sql_filter);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| MemoryError::Persistence(format!("Failed to execute search: {e}")))?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| MemoryError::Persistence(format!("Failed to collect search results: {e}")))?;

        let mut records = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                records.push(Self::batch_to_record(batch, row)?);
            }
        }
        debug!(count = records.len(), "LanceDB nearest-neighbour search");
        Ok(records)
    }

    async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| MemoryError::Persistence(format!("Failed to count records: {e}")))
    }

    async fn ping(&self) -> Result<()> {
        self.connection
            .table_names()
            .execute()
            .await
            .map(|_| ())
            .map_err(|e| MemoryError::Persistence(format!("LanceDB unreachable: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{ConversationTurn, MemoryItem};

    fn record(key: &str, content: &str, embedding: Vec<f32>) -> ColdRecord {
        let turn = ConversationTurn::new(
            key,
            vec![MemoryItem::new(content, key, "user-1", "spectra")],
            "spectra",
            "response",
        )
        .with_confidence(0.9);
        ColdRecord::from_turn(&turn, embedding.clone(), embedding).unwrap()
    }

    #[tokio::test]
    async fn test_connect_creates_table() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LanceColdBackend::connect(temp_dir.path(), "memories", 4)
            .await
            .unwrap();

        assert_eq!(backend.count().await.unwrap(), 0);
        backend.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_with_other_dimension_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        LanceColdBackend::connect(temp_dir.path(), "memories", 4)
            .await
            .unwrap();

        let result = LanceColdBackend::connect(temp_dir.path(), "memories", 8).await;
        assert!(matches!(result, Err(MemoryError::Config(_))));
    }

    #[tokio::test]
    async fn test_schema_has_record_columns() {
        let schema = LanceColdBackend::schema(768);
        assert_eq!(schema.fields().len(), 13);

        match schema.field_with_name(CONTENT_EMBEDDING).unwrap().data_type() {
            DataType::FixedSizeList(_, size) => assert_eq!(*size, 768),
            other => panic!("Expected FixedSizeList, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_insert_and_search_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LanceColdBackend::connect(temp_dir.path(), "memories", 2)
            .await
            .unwrap();

        let original = record("chan-1", "o'clock meeting", vec![0.6, 0.8]);
        backend.insert(&original).await.unwrap();

        let hits = backend
            .nearest(&[0.6, 0.8], &RecordFilter::for_conversation("chan-1"), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let found = &hits[0];
        assert_eq!(found.id, original.id);
        assert_eq!(found.original_content, "o'clock meeting");
        assert_eq!(found.content_embedding, original.content_embedding);
        assert_eq!(found.context_blob, original.context_blob);
        assert_eq!(
            found.created_at.timestamp_micros(),
            original.created_at.timestamp_micros()
        );
        assert!((found.importance_score - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_empty_table() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LanceColdBackend::connect(temp_dir.path(), "memories", 2)
            .await
            .unwrap();

        let hits = backend
            .nearest(&[1.0, 0.0], &RecordFilter::new(), 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_filter_with_quote_in_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LanceColdBackend::connect(temp_dir.path(), "memories", 2)
            .await
            .unwrap();

        backend.insert(&record("it's", "a", vec![1.0, 0.0])).await.unwrap();
        backend.insert(&record("other", "b", vec![1.0, 0.0])).await.unwrap();

        let hits = backend
            .nearest(&[1.0, 0.0], &RecordFilter::for_conversation("it's"), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].conversation_key, "it's");
    }

    #[tokio::test]
    async fn test_ensure_index_skips_small_tables() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LanceColdBackend::connect(temp_dir.path(), "memories", 2)
            .await
            .unwrap();
        backend.insert(&record("k", "a", vec![1.0, 0.0])).await.unwrap();

        assert!(!backend.ensure_index().await.unwrap());
    }
}
