//! Error types for recollect

use thiserror::Error;

/// Main error type for memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Hot tier backing store is unreachable or timed out
    #[error("Backing store unavailable: {0}")]
    BackingStoreUnavailable(String),

    /// Cold tier insert or query failed (connectivity, timeout, constraint)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Malformed input rejected before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// Embedding provider error or quota exhaustion
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Short label used as a structured log field
    pub fn tier_label(&self) -> &'static str {
        match self {
            MemoryError::BackingStoreUnavailable(_) => "hot",
            MemoryError::Persistence(_) => "cold",
            MemoryError::Validation(_) => "validation",
            MemoryError::Embedding(_) => "embedding",
            MemoryError::Config(_) => "config",
            MemoryError::Serialization(_) => "serialization",
            MemoryError::Io(_) => "io",
        }
    }
}

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;
