//! Read-only counters across both tiers
//!
//! A tier that cannot be reached reports `None` counts and its error instead of
//! failing the whole snapshot.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::memory::cold::ColdMemoryStore;
use crate::memory::hot::HotMemoryStore;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    /// Conversations with at least one hot entry
    pub hot_keys: Option<usize>,
    pub hot_entries: Option<usize>,
    pub cold_records: Option<usize>,
    pub hot_reachable: bool,
    pub cold_reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cold_error: Option<String>,
}

pub struct StatsReporter {
    hot: Arc<HotMemoryStore>,
    cold: Arc<ColdMemoryStore>,
}

impl StatsReporter {
    pub fn new(hot: Arc<HotMemoryStore>, cold: Arc<ColdMemoryStore>) -> Self {
        Self { hot, cold }
    }

    pub async fn collect(&self) -> MemoryStats {
        let (hot, cold) = tokio::join!(self.hot.stats(), self.cold.count());
        let mut stats = MemoryStats::default();

        match hot {
            Ok(hot) => {
                stats.hot_reachable = true;
                stats.hot_keys = Some(hot.keys);
                stats.hot_entries = Some(hot.entries);
            }
            Err(e) => {
                warn!(operation = "stats", tier = "hot", "Hot stats unavailable: {e}");
                stats.hot_error = Some(e.to_string());
            }
        }
        match cold {
            Ok(count) => {
                stats.cold_reachable = true;
                stats.cold_records = Some(count);
            }
            Err(e) => {
                warn!(operation = "stats", tier = "cold", "Cold stats unavailable: {e}");
                stats.cold_error = Some(e.to_string());
            }
        }

        stats
    }
}
