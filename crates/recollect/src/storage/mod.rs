//! Backing-store adapters for both tiers
//!
//! The hot tier runs on Redis or an in-process map; the cold tier runs on LanceDB or an
//! in-process vector scan.

pub mod filter;
pub mod lance;
pub mod memory;
pub mod redis;

pub use filter::RecordFilter;
pub use lance::LanceColdBackend;
pub use memory::{InMemoryColdBackend, InMemoryHotBackend};
pub use self::redis::RedisHotBackend;
