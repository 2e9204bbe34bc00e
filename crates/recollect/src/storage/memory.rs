//! In-process backends
//!
//! Used when no Redis URL is configured and throughout the test suite. The hot backend
//! mirrors Redis list semantics (inclusive, tail-relative indices; per-key expiry that
//! hides the key once passed) and keys its expiry off an injected [`Clock`], so TTL
//! behaviour can be exercised without sleeping.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::embedding::cosine_similarity;
use crate::error::{MemoryError, Result};
use crate::memory::cold::ColdBackend;
use crate::memory::hot::HotBackend;
use crate::memory::types::ColdRecord;
use crate::storage::filter::RecordFilter;

#[derive(Debug, Default)]
struct HotList {
    values: VecDeque<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl HotList {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Concurrent map of bounded lists with lazy expiry
#[derive(Debug)]
pub struct InMemoryHotBackend {
    lists: DashMap<String, HotList>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryHotBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryHotBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            lists: DashMap::new(),
            clock,
        }
    }

    fn evict_if_expired(&self, key: &str) {
        let now = self.clock.now();
        self.lists.remove_if(key, |_, list| list.is_expired(now));
    }
}

#[async_trait]
impl HotBackend for InMemoryHotBackend {
    async fn prepend_bounded(&self, key: &str, value: String, max_len: usize) -> Result<()> {
        self.evict_if_expired(key);

        // The entry guard holds the shard lock, so prepend and trim are one step
        let mut list = self.lists.entry(key.to_string()).or_default();
        list.values.push_front(value);
        list.values.truncate(max_len);
        Ok(())
    }

    async fn read_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.evict_if_expired(key);

        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.values.len(), start, stop) {
            Some((from, to)) => list.values.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        self.evict_if_expired(key);

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| MemoryError::BackingStoreUnavailable(format!("Invalid TTL: {e}")))?;
        if let Some(mut list) = self.lists.get_mut(key) {
            list.expires_at = Some(self.clock.now() + ttl);
        }
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        Ok(self
            .lists
            .iter()
            .filter(|item| item.key().starts_with(prefix) && !item.value().is_expired(now))
            .map(|item| item.key().clone())
            .collect())
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        self.evict_if_expired(key);
        Ok(self.lists.get(key).map(|l| l.values.len()).unwrap_or(0))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Translate Redis-style inclusive indices into a bounded `[from, to]` pair
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

/// Exact-scan cold backend
#[derive(Debug, Default)]
pub struct InMemoryColdBackend {
    records: RwLock<Vec<ColdRecord>>,
}

impl InMemoryColdBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ColdBackend for InMemoryColdBackend {
    async fn insert(&self, record: &ColdRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(MemoryError::Persistence(format!(
                "Record {} already exists",
                record.id
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<ColdRecord>> {
        let records = self.records.read().await;
        let mut scored: Vec<(f32, &ColdRecord)> = records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| (cosine_similarity(embedding, &r.content_embedding), r))
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_resolve_range_matches_redis() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 0, 19), Some((0, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(0, 0, 19), None);
        assert_eq!(resolve_range(5, 7, 9), None);
    }

    #[tokio::test]
    async fn test_prepend_bounded_trims_tail() {
        let backend = InMemoryHotBackend::default();
        for i in 0..5 {
            backend.prepend_bounded("k", i.to_string(), 3).await.unwrap();
        }
        assert_eq!(backend.read_range("k", 0, -1).await.unwrap(), vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_expired_key_reads_empty_and_restarts() {
        let clock = ManualClock::starting_now();
        let backend = InMemoryHotBackend::new(Arc::new(clock.clone()));

        backend.prepend_bounded("k", "a".to_string(), 10).await.unwrap();
        backend.set_expiry("k", Duration::from_secs(60)).await.unwrap();
        clock.advance(chrono::Duration::seconds(61));

        assert!(backend.read_range("k", 0, -1).await.unwrap().is_empty());
        assert!(backend.scan_keys("").await.unwrap().is_empty());

        backend.prepend_bounded("k", "b".to_string(), 10).await.unwrap();
        assert_eq!(backend.read_range("k", 0, -1).await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_set_expiry_on_missing_key_is_noop() {
        let backend = InMemoryHotBackend::default();
        backend.set_expiry("ghost", Duration::from_secs(1)).await.unwrap();
        assert_eq!(backend.list_len("ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cold_nearest_respects_filter_and_limit() {
        use crate::memory::types::{ConversationTurn, MemoryItem};

        let backend = InMemoryColdBackend::new();
        for (key, emb) in [("a", vec![1.0, 0.0]), ("a", vec![0.0, 1.0]), ("b", vec![1.0, 0.0])] {
            let turn = ConversationTurn::new(key, vec![MemoryItem::new("x", key, "u", "t")], "t", "r");
            let record = ColdRecord::from_turn(&turn, emb.clone(), emb).unwrap();
            backend.insert(&record).await.unwrap();
        }

        let hits = backend
            .nearest(&[1.0, 0.0], &RecordFilter::for_conversation("a"), 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].conversation_key, "a");
        assert_eq!(hits[0].content_embedding, vec![1.0, 0.0]);
    }
}
