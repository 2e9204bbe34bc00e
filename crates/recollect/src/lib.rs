//! Recollect - two-tier conversational memory
//!
//! Each conversation turn is pushed into a bounded, TTL-backed hot buffer and, once
//! embedded, appended to a durable cold store that supports cosine-similarity recall.
//! [`memory::MemoryCoordinator`] drives both tiers and reports per-tier outcomes so a
//! failure in one never hides a success in the other.

pub mod clock;
pub mod config;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod storage;
pub mod testing;

pub use config::Config;
pub use error::MemoryError;
pub use memory::{ConversationTurn, MemoryCoordinator, MemoryItem, RecallScope};
