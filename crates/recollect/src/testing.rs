//! Test utilities for recollect - deterministic providers and faulty backends
//!
//! This module provides utilities to keep tests fast and independent of external services:
//! - Mock embedding providers that never load a model or touch the network
//! - Backends that fail or stall on every call, for degradation tests

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::cold::ColdBackend;
use crate::memory::hot::HotBackend;
use crate::memory::types::ColdRecord;
use crate::storage::filter::RecordFilter;

/// Mock embedding provider for tests that don't need real ML.
/// Produces deterministic vectors of the configured dimension based on input text hash.
#[derive(Debug, Default)]
pub struct MockEmbeddingProvider {
    dimension: usize,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Generate a deterministic "embedding" from text using hashing, values in [-1, 1].
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        (0..self.dimension)
            .map(|i| {
                let x = seed
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9e3779b97f4a7c15);
                let normalized = (x as f32) / (u64::MAX as f32);
                (normalized * 2.0) - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Provider with hand-picked vectors per text, for similarity tests that need exact geometry.
#[derive(Debug, Default)]
pub struct StaticEmbeddingProvider {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Option<Vec<f32>>,
}

impl StaticEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Vector returned for any text without an explicit mapping
    pub fn with_fallback(mut self, vector: Vec<f32>) -> Self {
        self.fallback = Some(vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.vectors
            .get(text)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| MemoryError::Embedding(format!("No vector registered for {text:?}")))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Provider whose every call fails with the given message
#[derive(Debug)]
pub struct FailingEmbeddingProvider {
    message: String,
}

impl FailingEmbeddingProvider {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(MemoryError::Embedding(self.message.clone()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Hot backend that is never reachable
#[derive(Debug, Default)]
pub struct UnavailableHotBackend;

impl UnavailableHotBackend {
    fn refuse<T>() -> Result<T> {
        Err(MemoryError::BackingStoreUnavailable(
            "connection refused".to_string(),
        ))
    }
}

#[async_trait]
impl HotBackend for UnavailableHotBackend {
    async fn prepend_bounded(&self, _key: &str, _value: String, _max_len: usize) -> Result<()> {
        Self::refuse()
    }

    async fn read_range(&self, _key: &str, _start: isize, _stop: isize) -> Result<Vec<String>> {
        Self::refuse()
    }

    async fn set_expiry(&self, _key: &str, _ttl: Duration) -> Result<()> {
        Self::refuse()
    }

    async fn scan_keys(&self, _prefix: &str) -> Result<Vec<String>> {
        Self::refuse()
    }

    async fn list_len(&self, _key: &str) -> Result<usize> {
        Self::refuse()
    }

    async fn ping(&self) -> Result<()> {
        Self::refuse()
    }
}

/// Hot backend whose calls never complete
#[derive(Debug, Default)]
pub struct StallingHotBackend;

#[async_trait]
impl HotBackend for StallingHotBackend {
    async fn prepend_bounded(&self, _key: &str, _value: String, _max_len: usize) -> Result<()> {
        std::future::pending().await
    }

    async fn read_range(&self, _key: &str, _start: isize, _stop: isize) -> Result<Vec<String>> {
        std::future::pending().await
    }

    async fn set_expiry(&self, _key: &str, _ttl: Duration) -> Result<()> {
        std::future::pending().await
    }

    async fn scan_keys(&self, _prefix: &str) -> Result<Vec<String>> {
        std::future::pending().await
    }

    async fn list_len(&self, _key: &str) -> Result<usize> {
        std::future::pending().await
    }

    async fn ping(&self) -> Result<()> {
        std::future::pending().await
    }
}

/// Cold backend whose every call fails as a persistence error
#[derive(Debug, Default)]
pub struct FailingColdBackend {
    inserts: AtomicUsize,
}

impl FailingColdBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of insert attempts that reached the backend
    pub fn insert_attempts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ColdBackend for FailingColdBackend {
    async fn insert(&self, _record: &ColdRecord) -> Result<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Err(MemoryError::Persistence("disk full".to_string()))
    }

    async fn nearest(
        &self,
        _embedding: &[f32],
        _filter: &RecordFilter,
        _limit: usize,
    ) -> Result<Vec<ColdRecord>> {
        Err(MemoryError::Persistence("table unavailable".to_string()))
    }

    async fn count(&self) -> Result<usize> {
        Err(MemoryError::Persistence("table unavailable".to_string()))
    }

    async fn ping(&self) -> Result<()> {
        Err(MemoryError::Persistence("table unavailable".to_string()))
    }
}
