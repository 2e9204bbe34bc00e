//! Embedding provider seam
//!
//! Embedding generation is an external capability. This module defines the narrow
//! [`EmbeddingProvider`] interface, the input preparation policy applied before every
//! call, and the cosine similarity used by the cold tier.

pub mod local;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};

pub use local::FastEmbedProvider;
pub use remote::RemoteEmbeddingProvider;

/// Turns text into a fixed-dimension vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single, already prepared, non-empty text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// Apply the input policy: whitespace-only text yields `None`, anything longer than
/// `max_chars` characters loses its tail.
pub fn prepare_input(text: &str, max_chars: usize) -> Option<&str> {
    if text.trim().is_empty() {
        return None;
    }

    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Some(&text[..byte_idx]),
        None => Some(text),
    }
}

/// Cosine similarity; zero-magnitude vectors compare as 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Provider wrapped with the input budget, a call timeout and a dimension check
#[derive(Clone)]
pub struct TextEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    max_input_chars: usize,
    timeout: Duration,
}

impl TextEmbedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        dimension: usize,
        max_input_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            dimension,
            max_input_chars,
            timeout,
        }
    }

    /// Build the configured provider
    ///
    /// The local provider loads (and on first run downloads) its model here.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
            "local" => {
                let local = FastEmbedProvider::new(&config.model)?;
                if local.dimension() != config.dimension {
                    return Err(MemoryError::Config(format!(
                        "Model {} produces {} dimensions but embedding.dimension is {}",
                        config.model,
                        local.dimension(),
                        config.dimension
                    )));
                }
                Arc::new(local)
            }
            "remote" => Arc::new(RemoteEmbeddingProvider::new(config)?),
            other => {
                return Err(MemoryError::Config(format!(
                    "Unknown embedding provider: {other}"
                )));
            }
        };

        Ok(Self::new(
            provider,
            config.dimension,
            config.effective_max_input_chars(),
            config.timeout(),
        ))
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed `text`, returning `Ok(None)` without calling the provider when there is
    /// nothing to embed.
    pub async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let Some(input) = prepare_input(text, self.max_input_chars) else {
            return Ok(None);
        };

        let embedding = tokio::time::timeout(self.timeout, self.provider.embed(input))
            .await
            .map_err(|_| {
                MemoryError::Embedding(format!(
                    "{} timed out after {:?}",
                    self.provider.name(),
                    self.timeout
                ))
            })??;

        if embedding.len() != self.dimension {
            return Err(MemoryError::Embedding(format!(
                "{} returned {} dimensions, expected {}",
                self.provider.name(),
                embedding.len(),
                self.dimension
            )));
        }

        Ok(Some(embedding))
    }
}
