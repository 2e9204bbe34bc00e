//! Redis-backed hot tier
//!
//! Lists live under `{prefix}:{conversation_key}:messages`. Prepend and trim run in a
//! single MULTI/EXEC pipeline so concurrent writers to the same key never observe an
//! over-long list. Expiry is delegated to Redis via PEXPIRE.
//!
//! The connection manager is created lazily on first use: a coordinator can be built
//! while Redis is down, and hot calls simply fail until it comes back.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{MemoryError, Result};
use crate::memory::hot::HotBackend;

const SCAN_BATCH: usize = 100;

pub struct RedisHotBackend {
    client: Client,
    manager: OnceCell<ConnectionManager>,
}

impl RedisHotBackend {
    /// Parse `url` without connecting
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| MemoryError::Config(format!("Invalid Redis URL: {e}")))?;
        Ok(Self {
            client,
            manager: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(unavailable)?;
                info!("Connected to Redis hot tier");
                Ok::<_, MemoryError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }
}

fn unavailable(e: RedisError) -> MemoryError {
    MemoryError::BackingStoreUnavailable(e.to_string())
}

/// Escape glob metacharacters so a key prefix matches literally in SCAN MATCH
fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl HotBackend for RedisHotBackend {
    async fn prepend_bounded(&self, key: &str, value: String, max_len: usize) -> Result<()> {
        let mut conn = self.connection().await?;
        let stop = max_len as isize - 1;

        let _: () = redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(value)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg(stop)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn read_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let _: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once across iterations
        keys.sort();
        keys.dedup();
        debug!(pattern, count = keys.len(), "Scanned hot keys");
        Ok(keys)
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.connection().await?;
        redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("conversation:"), "conversation:");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        assert!(matches!(
            RedisHotBackend::new("not a url"),
            Err(MemoryError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let backend = RedisHotBackend::new("redis://127.0.0.1:1/").unwrap();
        assert!(matches!(
            backend.ping().await,
            Err(MemoryError::BackingStoreUnavailable(_))
        ));
    }

    #[cfg(feature = "redis-tests")]
    #[tokio::test]
    async fn test_prepend_bounded_against_live_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let backend = RedisHotBackend::new(&url).unwrap();
        let key = format!("recollect-test:{}:messages", uuid::Uuid::new_v4());

        for i in 0..5 {
            backend.prepend_bounded(&key, i.to_string(), 3).await.unwrap();
        }
        backend.set_expiry(&key, Duration::from_secs(30)).await.unwrap();

        assert_eq!(backend.read_range(&key, 0, 2).await.unwrap(), vec!["4", "3", "2"]);
        assert_eq!(backend.list_len(&key).await.unwrap(), 3);
    }
}
