//! Hot tier: bounded, TTL-backed recency buffer per conversation
//!
//! Entries are JSON [`HotEntry`] snapshots kept most-recent-first in a list per
//! conversation key. The list is trimmed on every push and the key's expiry is reset;
//! expiry itself is left to the backing store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::HotConfig;
use crate::error::{MemoryError, Result};
use crate::memory::types::HotEntry;

const KEY_SUFFIX: &str = ":messages";

/// Key-value/list store the hot tier is layered on
///
/// Index arguments follow Redis list semantics: inclusive bounds, negative values
/// count from the tail.
#[async_trait]
pub trait HotBackend: Send + Sync {
    /// Atomically prepend `value` and drop everything past `max_len`
    async fn prepend_bounded(&self, key: &str, value: String, max_len: usize) -> Result<()>;

    /// Read the list slice `[start, stop]`
    async fn read_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    /// Expire `key` after `ttl` from now
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Live keys beginning with `prefix`
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Number of values stored under `key`
    async fn list_len(&self, key: &str) -> Result<usize>;

    async fn ping(&self) -> Result<()>;
}

/// Aggregate hot-tier counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HotStats {
    pub keys: usize,
    pub entries: usize,
}

pub struct HotMemoryStore {
    backend: Arc<dyn HotBackend>,
    clock: Arc<dyn Clock>,
    limit: usize,
    ttl: Duration,
    key_prefix: String,
    timeout: Duration,
}

impl HotMemoryStore {
    pub fn new(backend: Arc<dyn HotBackend>, config: &HotConfig) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            limit: config.limit,
            ttl: config.ttl(),
            key_prefix: config.key_prefix.clone(),
            timeout: config.timeout(),
        }
    }

    /// Use a different time source for entry-age checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Backing-store key for a conversation
    pub fn storage_key(&self, conversation_key: &str) -> String {
        format!("{}:{}{}", self.key_prefix, conversation_key, KEY_SUFFIX)
    }

    /// Prepend `entry`, trim to the limit and reset the key's TTL
    pub async fn push(&self, conversation_key: &str, entry: &HotEntry) -> Result<()> {
        let ttl = entry
            .ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(self.ttl);
        let value = serde_json::to_string(entry)
            .map_err(|e| MemoryError::Serialization(format!("Failed to encode hot entry: {e}")))?;
        let key = self.storage_key(conversation_key);

        self.bounded("prepend", self.backend.prepend_bounded(&key, value, self.limit))
            .await?;
        self.bounded("expire", self.backend.set_expiry(&key, ttl))
            .await?;

        debug!(conversation_key, "Hot entry pushed");
        Ok(())
    }

    /// Entries for `conversation_key`, most-recent-first
    ///
    /// Entries that fail to decode, or whose age exceeds their TTL, are skipped.
    pub async fn load(&self, conversation_key: &str) -> Result<Vec<HotEntry>> {
        let key = self.storage_key(conversation_key);
        let stop = self.limit as isize - 1;
        let raw = self
            .bounded("read", self.backend.read_range(&key, 0, stop))
            .await?;

        let now = self.clock.now();
        let mut entries = Vec::with_capacity(raw.len());
        let mut skipped = 0usize;

        for value in raw.iter().take(self.limit) {
            match serde_json::from_str::<HotEntry>(value) {
                Ok(entry) => {
                    let ttl = entry
                        .ttl_secs
                        .map(Duration::from_secs)
                        .unwrap_or(self.ttl);
                    if is_stale(&entry, ttl, now) {
                        skipped += 1;
                        continue;
                    }
                    entries.push(entry);
                }
                Err(e) => {
                    skipped += 1;
                    warn!(conversation_key, "Skipping malformed hot entry: {e}");
                }
            }
        }

        debug!(
            conversation_key,
            count = entries.len(),
            skipped,
            "Hot entries loaded"
        );
        Ok(entries)
    }

    /// Count tracked conversations and their stored entries
    pub async fn stats(&self) -> Result<HotStats> {
        let prefix = format!("{}:", self.key_prefix);
        let keys = self
            .bounded("scan", self.backend.scan_keys(&prefix))
            .await?;

        let mut stats = HotStats::default();
        for key in keys.iter().filter(|k| k.ends_with(KEY_SUFFIX)) {
            let len = self.bounded("len", self.backend.list_len(key)).await?;
            if len > 0 {
                stats.keys += 1;
                stats.entries += len;
            }
        }
        Ok(stats)
    }

    pub async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.backend.ping()).await
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                MemoryError::BackingStoreUnavailable(format!(
                    "hot {op} timed out after {:?}",
                    self.timeout
                ))
            })?
    }
}

fn is_stale(entry: &HotEntry, ttl: Duration, now: chrono::DateTime<chrono::Utc>) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => entry.written_at + ttl <= now,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::memory::InMemoryHotBackend;
    use chrono::Utc;

    fn store_with(limit: usize, clock: &ManualClock) -> (HotMemoryStore, Arc<InMemoryHotBackend>) {
        let backend = Arc::new(InMemoryHotBackend::new(Arc::new(clock.clone())));
        let config = HotConfig {
            limit,
            ..HotConfig::default()
        };
        let store = HotMemoryStore::new(backend.clone(), &config).with_clock(Arc::new(clock.clone()));
        (store, backend)
    }

    fn entry(key: &str, response: &str, clock: &ManualClock) -> HotEntry {
        HotEntry {
            written_at: clock.now(),
            messages: Vec::new(),
            selected_agent: "spectra".to_string(),
            response_content: response.to_string(),
            confidence: 0.5,
            conversation_key: key.to_string(),
            ttl_secs: None,
        }
    }

    #[test]
    fn test_storage_key_format() {
        let clock = ManualClock::starting_now();
        let (store, _) = store_with(20, &clock);
        assert_eq!(store.storage_key("1234"), "conversation:1234:messages");
    }

    #[tokio::test]
    async fn test_load_absent_key_is_empty() {
        let clock = ManualClock::starting_now();
        let (store, _) = store_with(20, &clock);
        assert!(store.load("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_is_most_recent_first() {
        let clock = ManualClock::starting_now();
        let (store, _) = store_with(20, &clock);

        store.push("k", &entry("k", "first", &clock)).await.unwrap();
        store.push("k", &entry("k", "second", &clock)).await.unwrap();

        let loaded = store.load("k").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].response_content, "second");
        assert_eq!(loaded[1].response_content, "first");
    }

    #[tokio::test]
    async fn test_malformed_entries_skipped_individually() {
        let clock = ManualClock::starting_now();
        let (store, backend) = store_with(20, &clock);

        store.push("k", &entry("k", "good-1", &clock)).await.unwrap();
        backend
            .prepend_bounded(&store.storage_key("k"), "{not json".to_string(), 20)
            .await
            .unwrap();
        backend
            .prepend_bounded(&store.storage_key("k"), r#"{"messages":[]}"#.to_string(), 20)
            .await
            .unwrap();
        store.push("k", &entry("k", "good-2", &clock)).await.unwrap();

        let loaded = store.load("k").await.unwrap();
        let responses: Vec<&str> = loaded.iter().map(|e| e.response_content.as_str()).collect();
        assert_eq!(responses, vec!["good-2", "good-1"]);
    }

    #[tokio::test]
    async fn test_stale_entry_hidden_even_when_key_refreshed() {
        let clock = ManualClock::starting_now();
        let (store, _) = store_with(20, &clock);

        store.push("k", &entry("k", "old", &clock)).await.unwrap();
        clock.advance(chrono::Duration::hours(23));
        store.push("k", &entry("k", "new", &clock)).await.unwrap();
        clock.advance(chrono::Duration::hours(2));

        let loaded = store.load("k").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].response_content, "new");
    }

    #[tokio::test]
    async fn test_entry_ttl_override_extends_visibility() {
        let clock = ManualClock::starting_now();
        let (store, _) = store_with(20, &clock);

        let mut long_lived = entry("k", "keep", &clock);
        long_lived.ttl_secs = Some(3 * 86_400);
        store.push("k", &long_lived).await.unwrap();
        clock.advance(chrono::Duration::hours(48));

        let loaded = store.load("k").await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_counts_keys_and_entries() {
        let clock = ManualClock::starting_now();
        let (store, _) = store_with(3, &clock);

        for i in 0..5 {
            store.push("a", &entry("a", &format!("{i}"), &clock)).await.unwrap();
        }
        store.push("b", &entry("b", "only", &clock)).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats, HotStats { keys: 2, entries: 4 });
    }

    #[test]
    fn test_is_stale_boundary() {
        let now = Utc::now();
        let e = HotEntry {
            written_at: now - chrono::Duration::seconds(10),
            messages: Vec::new(),
            selected_agent: String::new(),
            response_content: String::new(),
            confidence: 0.5,
            conversation_key: "k".to_string(),
            ttl_secs: None,
        };
        assert!(is_stale(&e, Duration::from_secs(10), now));
        assert!(!is_stale(&e, Duration::from_secs(11), now));
    }
}
