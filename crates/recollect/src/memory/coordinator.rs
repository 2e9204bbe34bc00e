//! Memory coordinator
//!
//! Stateless per call: every operation fans out to the hot and cold stores
//! independently and reports what each tier did. The tiers are written best-effort
//! without a transaction; a cold failure never hides a hot success and vice versa.
//! The cold tier is the system of record, so a turn that only reached the hot tier is
//! a lost accelerator entry, not lost data.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::RecallConfig;
use crate::embedding::TextEmbedder;
use crate::error::{MemoryError, Result};
use crate::memory::cold::ColdMemoryStore;
use crate::memory::hot::HotMemoryStore;
use crate::memory::stats::StatsReporter;
use crate::memory::types::{ColdMatch, ColdRecord, ConversationTurn, HotEntry};

/// What happened to one tier during `record_turn`
#[derive(Debug)]
pub enum TierOutcome {
    /// Committed; the cold tier reports the new record's id
    Written(Option<Uuid>),
    /// Nothing to write for this tier
    Skipped(String),
    Failed(MemoryError),
}

impl TierOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, TierOutcome::Written(_))
    }

    pub fn error(&self) -> Option<&MemoryError> {
        match self {
            TierOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-tier result of recording a turn
#[derive(Debug)]
pub struct TurnOutcome {
    pub hot: TierOutcome,
    pub cold: TierOutcome,
}

impl TurnOutcome {
    pub fn fully_written(&self) -> bool {
        self.hot.is_written() && self.cold.is_written()
    }

    pub fn cold_record_id(&self) -> Option<Uuid> {
        match self.cold {
            TierOutcome::Written(id) => id,
            _ => None,
        }
    }
}

/// Which conversations a cold recall may search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecallScope {
    /// Only the conversation being recalled
    #[default]
    Conversation,
    /// Every conversation; honoured only when `recall.allow_global` is set
    Global,
}

/// Result of `recall`; failures degrade a tier to empty and are reported alongside
#[derive(Debug, Default)]
pub struct Recall {
    pub hot: Vec<HotEntry>,
    pub cold: Vec<ColdMatch>,
    pub hot_error: Option<MemoryError>,
    pub cold_error: Option<MemoryError>,
}

/// Reachability of both tiers
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub hot_reachable: bool,
    pub cold_reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cold_error: Option<String>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.hot_reachable && self.cold_reachable
    }
}

pub struct MemoryCoordinator {
    hot: Arc<HotMemoryStore>,
    cold: Arc<ColdMemoryStore>,
    embedder: TextEmbedder,
    recall: RecallConfig,
}

impl MemoryCoordinator {
    pub fn new(
        hot: HotMemoryStore,
        cold: ColdMemoryStore,
        embedder: TextEmbedder,
        recall: RecallConfig,
    ) -> Result<Self> {
        if embedder.dimension() != cold.dimension() {
            return Err(MemoryError::Config(format!(
                "Embedding dimension {} does not match cold tier dimension {}",
                embedder.dimension(),
                cold.dimension()
            )));
        }

        Ok(Self {
            hot: Arc::new(hot),
            cold: Arc::new(cold),
            embedder,
            recall,
        })
    }

    pub fn hot(&self) -> &HotMemoryStore {
        &self.hot
    }

    pub fn cold(&self) -> &ColdMemoryStore {
        &self.cold
    }

    /// Read-only counters over the same stores
    pub fn stats_reporter(&self) -> StatsReporter {
        StatsReporter::new(Arc::clone(&self.hot), Arc::clone(&self.cold))
    }

    /// Record a turn in both tiers
    ///
    /// Each tier gets exactly one attempt and the two run concurrently. Only input
    /// errors are returned as `Err`; tier failures are reported in the outcome.
    pub async fn record_turn(&self, turn: &ConversationTurn) -> Result<TurnOutcome> {
        validate_key(&turn.conversation_key)?;
        if !(0.0..=1.0).contains(&turn.confidence) {
            return Err(MemoryError::Validation(format!(
                "confidence must be within [0, 1], got {}",
                turn.confidence
            )));
        }

        let (hot, cold) = tokio::join!(self.write_hot(turn), self.write_cold(turn));

        let outcome = TurnOutcome { hot, cold };
        if let Some(e) = outcome.hot.error() {
            error!(
                conversation_key = %turn.conversation_key,
                operation = "record_turn",
                tier = "hot",
                "Hot write failed: {e}"
            );
        }
        if let Some(e) = outcome.cold.error() {
            error!(
                conversation_key = %turn.conversation_key,
                operation = "record_turn",
                tier = e.tier_label(),
                "Cold write failed: {e}"
            );
        }
        debug!(
            conversation_key = %turn.conversation_key,
            hot = outcome.hot.is_written(),
            cold = outcome.cold.is_written(),
            "Turn recorded"
        );

        Ok(outcome)
    }

    async fn write_hot(&self, turn: &ConversationTurn) -> TierOutcome {
        let entry = turn.to_hot_entry(self.hot.clock().now());
        match self.hot.push(&turn.conversation_key, &entry).await {
            Ok(()) => TierOutcome::Written(None),
            Err(e) => TierOutcome::Failed(e),
        }
    }

    async fn write_cold(&self, turn: &ConversationTurn) -> TierOutcome {
        let (content, response) = tokio::join!(
            self.embedder.embed(turn.primary_content()),
            self.embedder.embed(&turn.response_content)
        );

        let content_embedding = match content {
            Ok(Some(v)) => v,
            Ok(None) => return TierOutcome::Skipped("turn has no content to embed".to_string()),
            Err(e) => return TierOutcome::Failed(e),
        };
        let response_embedding = match response {
            Ok(Some(v)) => v,
            Ok(None) => return TierOutcome::Skipped("turn has no response to embed".to_string()),
            Err(e) => return TierOutcome::Failed(e),
        };

        let record = match ColdRecord::from_turn(turn, content_embedding, response_embedding) {
            Ok(record) => record,
            Err(e) => return TierOutcome::Failed(e),
        };

        match self.cold.write(&record).await {
            Ok(id) => TierOutcome::Written(Some(id)),
            Err(e) => TierOutcome::Failed(e),
        }
    }

    /// Hot entries for `conversation_key`, plus cold matches when `query` is given
    ///
    /// Never fails on tier errors: a failing tier comes back empty with its error set.
    pub async fn recall(
        &self,
        conversation_key: &str,
        query: Option<&str>,
        scope: RecallScope,
    ) -> Result<Recall> {
        validate_key(conversation_key)?;

        let scope = match scope {
            RecallScope::Global if !self.recall.allow_global => {
                warn!(
                    conversation_key,
                    operation = "recall",
                    "Global recall disabled, searching this conversation only"
                );
                RecallScope::Conversation
            }
            other => other,
        };
        let scope_key = match scope {
            RecallScope::Conversation => Some(conversation_key),
            RecallScope::Global => None,
        };

        let (hot, cold) = tokio::join!(
            self.hot.load(conversation_key),
            self.search_cold(query, scope_key)
        );

        let mut recall = Recall::default();
        match hot {
            Ok(entries) => recall.hot = entries,
            Err(e) => {
                warn!(conversation_key, operation = "recall", tier = "hot", "Hot load failed: {e}");
                recall.hot_error = Some(e);
            }
        }
        match cold {
            Ok(matches) => recall.cold = matches,
            Err(e) => {
                warn!(
                    conversation_key,
                    operation = "recall",
                    tier = e.tier_label(),
                    "Cold recall degraded: {e}"
                );
                recall.cold_error = Some(e);
            }
        }

        Ok(recall)
    }

    async fn search_cold(&self, query: Option<&str>, scope: Option<&str>) -> Result<Vec<ColdMatch>> {
        let Some(query) = query else {
            return Ok(Vec::new());
        };
        let Some(embedding) = self.embedder.embed(query).await? else {
            return Ok(Vec::new());
        };
        self.cold.query_default(&embedding, scope).await
    }

    /// Ping both tiers
    pub async fn health(&self) -> HealthReport {
        let (hot, cold) = tokio::join!(self.hot.ping(), self.cold.ping());
        HealthReport {
            hot_reachable: hot.is_ok(),
            cold_reachable: cold.is_ok(),
            hot_error: hot.err().map(|e| e.to_string()),
            cold_error: cold.err().map(|e| e.to_string()),
        }
    }
}

fn validate_key(conversation_key: &str) -> Result<()> {
    if conversation_key.trim().is_empty() {
        return Err(MemoryError::Validation(
            "conversation_key must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColdConfig, HotConfig};
    use crate::memory::types::MemoryItem;
    use crate::storage::memory::{InMemoryColdBackend, InMemoryHotBackend};
    use crate::testing::{MockEmbeddingProvider, UnavailableHotBackend};
    use std::time::Duration;

    fn coordinator_with(hot: HotMemoryStore, allow_global: bool) -> MemoryCoordinator {
        let cold = ColdMemoryStore::new(Arc::new(InMemoryColdBackend::new()), 8, &ColdConfig::default());
        let embedder = TextEmbedder::new(
            Arc::new(MockEmbeddingProvider::new(8)),
            8,
            8192,
            Duration::from_secs(1),
        );
        MemoryCoordinator::new(hot, cold, embedder, RecallConfig { allow_global }).unwrap()
    }

    fn coordinator() -> MemoryCoordinator {
        let hot = HotMemoryStore::new(Arc::new(InMemoryHotBackend::default()), &HotConfig::default());
        coordinator_with(hot, false)
    }

    fn turn(key: &str, content: &str) -> ConversationTurn {
        ConversationTurn::new(
            key,
            vec![MemoryItem::new(content, key, "user-1", "spectra")],
            "spectra",
            format!("reply to {content}"),
        )
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let coordinator = coordinator();
        let result = coordinator.record_turn(&turn("  ", "hello")).await;
        assert!(matches!(result, Err(MemoryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_record_turn_writes_both_tiers() {
        let coordinator = coordinator();
        let outcome = coordinator.record_turn(&turn("k", "hello")).await.unwrap();

        assert!(outcome.fully_written());
        assert!(outcome.cold_record_id().is_some());
        assert_eq!(coordinator.cold().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_content_is_hot_only() {
        let coordinator = coordinator();
        let outcome = coordinator.record_turn(&turn("k", "   ")).await.unwrap();

        assert!(outcome.hot.is_written());
        assert!(matches!(outcome.cold, TierOutcome::Skipped(_)));
        assert_eq!(coordinator.cold().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hot_outage_does_not_block_cold() {
        let hot = HotMemoryStore::new(Arc::new(UnavailableHotBackend), &HotConfig::default());
        let coordinator = coordinator_with(hot, false);

        let outcome = coordinator.record_turn(&turn("k", "hello")).await.unwrap();
        assert!(matches!(
            outcome.hot,
            TierOutcome::Failed(MemoryError::BackingStoreUnavailable(_))
        ));
        assert!(outcome.cold.is_written());
    }

    #[tokio::test]
    async fn test_global_recall_downgraded_when_disabled() {
        let coordinator = coordinator();
        coordinator.record_turn(&turn("other", "shared words")).await.unwrap();

        let recall = coordinator
            .recall("mine", Some("shared words"), RecallScope::Global)
            .await
            .unwrap();
        assert!(recall.cold.is_empty());
    }

    #[tokio::test]
    async fn test_global_recall_when_allowed() {
        let hot = HotMemoryStore::new(Arc::new(InMemoryHotBackend::default()), &HotConfig::default());
        let coordinator = coordinator_with(hot, true);
        coordinator.record_turn(&turn("other", "shared words")).await.unwrap();

        let recall = coordinator
            .recall("mine", Some("shared words"), RecallScope::Global)
            .await
            .unwrap();
        assert_eq!(recall.cold.len(), 1);
        assert_eq!(recall.cold[0].memory.conversation_key, "other");
    }

    #[tokio::test]
    async fn test_health_reports_each_tier() {
        let hot = HotMemoryStore::new(Arc::new(UnavailableHotBackend), &HotConfig::default());
        let coordinator = coordinator_with(hot, false);

        let health = coordinator.health().await;
        assert!(!health.hot_reachable);
        assert!(health.cold_reachable);
        assert!(!health.healthy());
        assert!(health.hot_error.is_some());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let hot = HotMemoryStore::new(Arc::new(InMemoryHotBackend::default()), &HotConfig::default());
        let cold = ColdMemoryStore::new(Arc::new(InMemoryColdBackend::new()), 4, &ColdConfig::default());
        let embedder = TextEmbedder::new(
            Arc::new(MockEmbeddingProvider::new(8)),
            8,
            100,
            Duration::from_secs(1),
        );
        assert!(matches!(
            MemoryCoordinator::new(hot, cold, embedder, RecallConfig::default()),
            Err(MemoryError::Config(_))
        ));
    }
}
