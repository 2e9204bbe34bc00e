//! Memory types for the recollect system
//!
//! Defines the fixed record shapes that flow through both tiers: the caller-facing
//! [`ConversationTurn`], the hot-tier [`HotEntry`] snapshot, and the cold-tier
//! [`ColdRecord`] row together with its query-facing summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{MemoryError, Result};

/// Confidence assigned when the caller does not supply one
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

/// One observed conversational fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Message text
    pub content: String,
    /// When the message was observed
    pub timestamp: DateTime<Utc>,
    /// Opaque grouping key (channel, session, ...)
    pub conversation_key: String,
    /// Author of the message
    pub actor_id: String,
    /// Responder that produced or owns this message
    pub agent_tag: String,
    /// Confidence in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Open extension point
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MemoryItem {
    /// Create an item stamped with the current time and default confidence
    pub fn new(
        content: impl Into<String>,
        conversation_key: impl Into<String>,
        actor_id: impl Into<String>,
        agent_tag: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            timestamp: Utc::now(),
            conversation_key: conversation_key.into(),
            actor_id: actor_id.into(),
            agent_tag: agent_tag.into(),
            confidence: DEFAULT_CONFIDENCE,
            metadata: Map::new(),
        }
    }

    /// Set the confidence, clamped into [0, 1]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Attach a metadata value
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A conversation turn handed to the coordinator by the message-handling layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub conversation_key: String,
    /// Messages of the exchange, oldest first; the last one is the primary content
    pub messages: Vec<MemoryItem>,
    pub selected_agent: String,
    pub response_content: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Replaces the configured hot TTL for this push
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_override_secs: Option<u64>,
}

impl ConversationTurn {
    pub fn new(
        conversation_key: impl Into<String>,
        messages: Vec<MemoryItem>,
        selected_agent: impl Into<String>,
        response_content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_key: conversation_key.into(),
            messages,
            selected_agent: selected_agent.into(),
            response_content: response_content.into(),
            confidence: DEFAULT_CONFIDENCE,
            ttl_override_secs: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_ttl_override(mut self, ttl: std::time::Duration) -> Self {
        self.ttl_override_secs = Some(ttl.as_secs());
        self
    }

    /// The latest message, whose content is what the cold tier indexes
    pub fn latest_message(&self) -> Option<&MemoryItem> {
        self.messages.last()
    }

    /// Content of the latest message, or an empty string when there are no messages
    pub fn primary_content(&self) -> &str {
        self.latest_message()
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    /// Snapshot this turn for the hot tier
    pub fn to_hot_entry(&self, written_at: DateTime<Utc>) -> HotEntry {
        HotEntry {
            written_at,
            messages: self.messages.clone(),
            selected_agent: self.selected_agent.clone(),
            response_content: self.response_content.clone(),
            confidence: self.confidence,
            conversation_key: self.conversation_key.clone(),
            ttl_secs: self.ttl_override_secs,
        }
    }
}

/// Serialized snapshot stored in the hot tier, one per recorded turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotEntry {
    pub written_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<MemoryItem>,
    #[serde(default)]
    pub selected_agent: String,
    #[serde(default)]
    pub response_content: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    pub conversation_key: String,
    /// Per-entry TTL that replaced the configured one when this entry was pushed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

/// A persisted long-term memory row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdRecord {
    pub id: Uuid,
    pub conversation_key: String,
    pub actor_id: String,
    pub original_content: String,
    pub processed_content: String,
    pub selected_agent: String,
    pub agent_response: String,
    pub confidence: f32,
    pub content_embedding: Vec<f32>,
    pub response_embedding: Vec<f32>,
    /// Opaque JSON snapshot of the originating turn
    pub context_blob: String,
    /// Always `min(confidence, 1.0)`
    pub importance_score: f32,
    pub created_at: DateTime<Utc>,
}

impl ColdRecord {
    /// Build a record from a turn and its precomputed embeddings
    pub fn from_turn(
        turn: &ConversationTurn,
        content_embedding: Vec<f32>,
        response_embedding: Vec<f32>,
    ) -> Result<Self> {
        let latest = turn.latest_message();
        let content = turn.primary_content().to_string();
        let context_blob = serde_json::to_string(turn)
            .map_err(|e| MemoryError::Serialization(format!("Failed to encode turn: {e}")))?;

        Ok(Self {
            id: Uuid::new_v4(),
            conversation_key: turn.conversation_key.clone(),
            actor_id: latest.map(|m| m.actor_id.clone()).unwrap_or_default(),
            processed_content: content.clone(),
            original_content: content,
            selected_agent: turn.selected_agent.clone(),
            agent_response: turn.response_content.clone(),
            confidence: turn.confidence,
            content_embedding,
            response_embedding,
            context_blob,
            importance_score: importance_from_confidence(turn.confidence),
            created_at: Utc::now(),
        })
    }

    pub fn summary(&self) -> ColdMemorySummary {
        ColdMemorySummary {
            id: self.id,
            conversation_key: self.conversation_key.clone(),
            content: self.original_content.clone(),
            agent_response: self.agent_response.clone(),
            selected_agent: self.selected_agent.clone(),
            importance_score: self.importance_score,
            created_at: self.created_at,
        }
    }
}

/// Confidence clamped into [0, 1]
pub fn importance_from_confidence(confidence: f32) -> f32 {
    confidence.clamp(0.0, 1.0)
}

/// The fields of a cold record a caller needs to build prompt context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdMemorySummary {
    pub id: Uuid,
    pub conversation_key: String,
    pub content: String,
    pub agent_response: String,
    pub selected_agent: String,
    pub importance_score: f32,
    pub created_at: DateTime<Utc>,
}

/// A cold-tier query hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdMatch {
    pub memory: ColdMemorySummary,
    /// Cosine similarity against the query embedding
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_turn() -> ConversationTurn {
        ConversationTurn::new(
            "chan-1",
            vec![
                MemoryItem::new("hello", "chan-1", "user-1", "spectra"),
                MemoryItem::new("what's the plan today?", "chan-1", "user-2", "lynq"),
            ],
            "lynq",
            "Let's start with the backlog.",
        )
        .with_confidence(0.8)
    }

    #[test]
    fn test_primary_content_is_latest_message() {
        let turn = sample_turn();
        assert_eq!(turn.primary_content(), "what's the plan today?");
    }

    #[test]
    fn test_primary_content_empty_without_messages() {
        let turn = ConversationTurn::new("chan-1", Vec::new(), "lynq", "hi");
        assert_eq!(turn.primary_content(), "");
        assert!(turn.latest_message().is_none());
    }

    #[test]
    fn test_hot_entry_snapshot_copies_turn() {
        let turn = sample_turn();
        let now = Utc::now();
        let entry = turn.to_hot_entry(now);

        assert_eq!(entry.written_at, now);
        assert_eq!(entry.messages.len(), 2);
        assert_eq!(entry.selected_agent, "lynq");
        assert_eq!(entry.response_content, "Let's start with the backlog.");
        assert_eq!(entry.conversation_key, "chan-1");
        assert!((entry.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cold_record_from_turn() {
        let turn = sample_turn();
        let record = ColdRecord::from_turn(&turn, vec![1.0, 0.0], vec![0.0, 1.0]).unwrap();

        assert_eq!(record.conversation_key, "chan-1");
        assert_eq!(record.actor_id, "user-2");
        assert_eq!(record.original_content, "what's the plan today?");
        assert_eq!(record.processed_content, record.original_content);
        assert_eq!(record.agent_response, "Let's start with the backlog.");
        assert!((record.importance_score - 0.8).abs() < f32::EPSILON);

        let blob: ConversationTurn = serde_json::from_str(&record.context_blob).unwrap();
        assert_eq!(blob.messages.len(), 2);
    }

    #[test]
    fn test_importance_clamped_to_unit_range() {
        assert_eq!(importance_from_confidence(1.7), 1.0);
        assert_eq!(importance_from_confidence(0.25), 0.25);
        assert_eq!(importance_from_confidence(-0.5), 0.0);
    }

    #[test]
    fn test_memory_item_confidence_clamped() {
        let item = MemoryItem::new("x", "k", "a", "t").with_confidence(3.0);
        assert_eq!(item.confidence, 1.0);
        let item = MemoryItem::new("x", "k", "a", "t").with_confidence(-1.0);
        assert_eq!(item.confidence, 0.0);
    }

    #[test]
    fn test_hot_entry_tolerates_missing_optional_fields() {
        let json = r#"{"written_at":"2026-01-01T00:00:00Z","conversation_key":"k"}"#;
        let entry: HotEntry = serde_json::from_str(json).unwrap();
        assert!(entry.messages.is_empty());
        assert_eq!(entry.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_hot_entry_requires_timestamp() {
        let json = r#"{"conversation_key":"k"}"#;
        assert!(serde_json::from_str::<HotEntry>(json).is_err());
    }

    #[test]
    fn test_ttl_override_not_serialized_when_absent() {
        let turn = sample_turn();
        let json = serde_json::to_string(&turn).unwrap();
        assert!(!json.contains("ttl_override_secs"));
    }
}
