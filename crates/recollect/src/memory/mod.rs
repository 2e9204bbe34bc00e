//! Memory tiers and their coordinator
//!
//! The hot tier is a bounded per-conversation recency buffer; the cold tier is the
//! durable, similarity-searchable system of record. [`MemoryCoordinator`] updates and
//! reads both for each conversation turn.

pub mod cold;
pub mod coordinator;
pub mod hot;
pub mod stats;
pub mod types;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, HotConfig};
use crate::embedding::TextEmbedder;
use crate::error::Result;
use crate::storage::{InMemoryHotBackend, LanceColdBackend, RedisHotBackend};

pub use cold::{ColdBackend, ColdMemoryStore};
pub use coordinator::{
    HealthReport, MemoryCoordinator, Recall, RecallScope, TierOutcome, TurnOutcome,
};
pub use hot::{HotBackend, HotMemoryStore, HotStats};
pub use stats::{MemoryStats, StatsReporter};
pub use types::{
    ColdMatch, ColdMemorySummary, ColdRecord, ConversationTurn, HotEntry, MemoryItem,
};

/// Hot store on Redis when a URL is configured, otherwise in-process
pub fn open_hot_store(config: &HotConfig) -> Result<HotMemoryStore> {
    let backend: Arc<dyn HotBackend> = match config.redis_url {
        Some(ref url) => Arc::new(RedisHotBackend::new(url)?),
        None => {
            info!("No Redis URL configured, hot tier is process-local");
            Arc::new(InMemoryHotBackend::default())
        }
    };
    Ok(HotMemoryStore::new(backend, config))
}

/// Cold store on LanceDB under `cold.data_dir`
pub async fn open_cold_store(config: &Config) -> Result<ColdMemoryStore> {
    std::fs::create_dir_all(&config.cold.data_dir)?;
    let backend = LanceColdBackend::connect(
        &config.cold.data_dir,
        &config.cold.table,
        config.embedding.dimension,
    )
    .await?;

    if let Err(e) = backend.ensure_index().await {
        warn!("Vector index unavailable, falling back to exact search: {e}");
    }

    Ok(ColdMemoryStore::new(
        Arc::new(backend),
        config.embedding.dimension,
        &config.cold,
    ))
}

impl MemoryCoordinator {
    /// Wire both tiers and the embedding provider from configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        let hot = open_hot_store(&config.hot)?;
        let cold = open_cold_store(config).await?;
        let embedder = TextEmbedder::from_config(&config.embedding)?;
        MemoryCoordinator::new(hot, cold, embedder, config.recall.clone())
    }
}

impl StatsReporter {
    /// Counters over the configured stores, without loading an embedding model
    pub async fn from_config(config: &Config) -> Result<Self> {
        let hot = open_hot_store(&config.hot)?;
        let cold = open_cold_store(config).await?;
        Ok(StatsReporter::new(Arc::new(hot), Arc::new(cold)))
    }
}
