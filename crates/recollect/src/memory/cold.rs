//! Cold tier: durable, append-only records with similarity recall
//!
//! Backends only have to return a candidate pool ordered roughly by closeness. The store
//! re-scores every candidate with exact cosine similarity against `content_embedding`,
//! then applies the threshold, ordering and `top_k` cut itself, so an approximate index
//! never changes what "similar enough" means.

use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::config::ColdConfig;
use crate::embedding::cosine_similarity;
use crate::error::{MemoryError, Result};
use crate::memory::types::{ColdMatch, ColdRecord};
use crate::storage::filter::RecordFilter;

/// Append-only vector-capable table the cold tier is layered on
#[async_trait]
pub trait ColdBackend: Send + Sync {
    async fn insert(&self, record: &ColdRecord) -> Result<()>;

    /// Up to `limit` records matching `filter`, closest to `embedding` first
    async fn nearest(
        &self,
        embedding: &[f32],
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<ColdRecord>>;

    async fn count(&self) -> Result<usize>;

    async fn ping(&self) -> Result<()>;
}

pub struct ColdMemoryStore {
    backend: Arc<dyn ColdBackend>,
    dimension: usize,
    default_top_k: usize,
    default_threshold: f32,
    candidate_multiplier: usize,
    timeout: Duration,
}

impl ColdMemoryStore {
    pub fn new(backend: Arc<dyn ColdBackend>, dimension: usize, config: &ColdConfig) -> Self {
        Self {
            backend,
            dimension,
            default_top_k: config.max_results,
            default_threshold: config.similarity_threshold,
            candidate_multiplier: config.candidate_multiplier.max(1),
            timeout: config.timeout(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    /// Persist a record, returning its id
    ///
    /// Records are checked before any I/O: both embeddings must have the store's
    /// dimension and finite values, and `original_content` must not be blank.
    pub async fn write(&self, record: &ColdRecord) -> Result<Uuid> {
        self.validate(record)?;

        self.bounded("insert", self.backend.insert(record)).await?;

        debug!(
            conversation_key = %record.conversation_key,
            id = %record.id,
            "Cold record written"
        );
        Ok(record.id)
    }

    /// Records similar to `embedding`, best first
    ///
    /// Only hits with similarity `>= threshold` are kept; ties are broken by the most
    /// recent `created_at`. A `scope` of `None` searches every conversation.
    pub async fn query(
        &self,
        embedding: &[f32],
        scope: Option<&str>,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ColdMatch>> {
        self.check_vector("query embedding", embedding)?;
        if threshold.is_nan() {
            return Err(MemoryError::Validation(
                "similarity threshold must be a number".to_string(),
            ));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let filter = match scope {
            Some(key) => RecordFilter::for_conversation(key),
            None => RecordFilter::new(),
        };
        let mut pool = top_k.saturating_mul(self.candidate_multiplier);
        let (matches, candidate_count) = loop {
            let candidates = self
                .bounded("query", self.backend.nearest(embedding, &filter, pool))
                .await?;
            let candidate_count = candidates.len();

            let scored: Vec<ColdMatch> = candidates
                .into_iter()
                .filter(|record| filter.matches(record))
                .map(|record| {
                    let similarity = cosine_similarity(embedding, &record.content_embedding);
                    ColdMatch {
                        memory: record.summary(),
                        similarity,
                    }
                })
                .collect();
            let floor = scored.iter().map(|m| m.similarity).min_by(f32::total_cmp);

            let mut matches: Vec<ColdMatch> = scored
                .into_iter()
                .filter(|m| m.similarity >= threshold)
                .collect();
            matches.sort_by(rank);

            // A full pool whose weakest candidate still reaches the cut may have left
            // newer records of equal similarity behind
            let cut_reached = candidate_count == pool
                && matches.len() >= top_k
                && floor.is_some_and(|f| f >= matches[top_k - 1].similarity);
            if cut_reached && pool < usize::MAX {
                pool = pool.saturating_mul(2);
                continue;
            }

            matches.truncate(top_k);
            break (matches, candidate_count);
        };

        debug!(
            scope = scope.unwrap_or("*"),
            candidates = candidate_count,
            returned = matches.len(),
            "Cold query complete"
        );
        Ok(matches)
    }

    /// Query with the configured `max_results` and `similarity_threshold`
    pub async fn query_default(
        &self,
        embedding: &[f32],
        scope: Option<&str>,
    ) -> Result<Vec<ColdMatch>> {
        self.query(embedding, scope, self.default_top_k, self.default_threshold)
            .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.bounded("count", self.backend.count()).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.backend.ping()).await
    }

    fn validate(&self, record: &ColdRecord) -> Result<()> {
        if record.original_content.trim().is_empty() {
            return Err(MemoryError::Validation(
                "original_content must not be empty".to_string(),
            ));
        }
        self.check_vector("content_embedding", &record.content_embedding)?;
        self.check_vector("response_embedding", &record.response_embedding)?;
        Ok(())
    }

    fn check_vector(&self, field: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(MemoryError::Validation(format!(
                "{field} has {} dimensions, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(MemoryError::Validation(format!(
                "{field} contains non-finite values"
            )));
        }
        Ok(())
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                MemoryError::Persistence(format!("cold {op} timed out after {:?}", self.timeout))
            })?
    }
}

/// Descending similarity, then newest first
pub fn rank(a: &ColdMatch, b: &ColdMatch) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
}
