//! Local embedding provider backed by fastembed
//!
//! The ONNX session is synchronous, so every call runs on the blocking pool behind a
//! mutex.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};

pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

/// Map a configured model name to the fastembed model and its output dimension
pub fn resolve_model(name: &str) -> Result<(FastEmbedModel, usize)> {
    match name.to_lowercase().as_str() {
        "multilingual-e5-base" => Ok((FastEmbedModel::MultilingualE5Base, 768)),
        "multilingual-e5-small" => Ok((FastEmbedModel::MultilingualE5Small, 384)),
        "bge-base-en-v1.5" => Ok((FastEmbedModel::BGEBaseENV15, 768)),
        "all-minilm-l6-v2" => Ok((FastEmbedModel::AllMiniLML6V2, 384)),
        "nomic-embed-text-v1.5" => Ok((FastEmbedModel::NomicEmbedTextV15, 768)),
        other => Err(MemoryError::Config(format!(
            "Unsupported local embedding model: {other}"
        ))),
    }
}

impl FastEmbedProvider {
    /// Load the named model, downloading it on first use
    pub fn new(model_name: &str) -> Result<Self> {
        let (model, dimension) = resolve_model(model_name)?;
        let model = TextEmbedding::try_new(InitOptions::new(model))
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| MemoryError::Embedding("Embedding model lock poisoned".to_string()))?;
            let embeddings = model
                .embed(vec![text], None)
                .map_err(|e| MemoryError::Embedding(e.to_string()))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| MemoryError::Embedding("No embedding returned".to_string()))
        })
        .await
        .map_err(|e| MemoryError::Embedding(format!("Embedding task failed: {e}")))?
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
