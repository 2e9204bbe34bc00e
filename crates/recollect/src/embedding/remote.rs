//! Remote embedding provider using OpenAI-compatible APIs
//!
//! Posts to `{api_url}/embeddings`. Quota and rate-limit responses surface as
//! embedding failures; there is deliberately no retry loop here, retry policy
//! belongs to the caller.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};

#[derive(Debug)]
pub struct RemoteEmbeddingProvider {
    client: Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl RemoteEmbeddingProvider {
    /// Build a provider from config, reading the API key from `api_key_env` if set
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.api_url.is_empty() {
            return Err(MemoryError::Config(
                "embedding.api_url is required for the remote provider".to_string(),
            ));
        }

        let api_key = env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            debug!(
                "API key env var '{}' not set, sending unauthenticated requests",
                config.api_key_env
            );
        }

        let provider = Self::with_endpoint(&config.api_url, &config.model, api_key, config.timeout())?;
        info!(
            "RemoteEmbeddingProvider initialized with model: {}, api_url: {}",
            config.model, config.api_url
        );
        Ok(provider)
    }

    pub fn with_endpoint(
        api_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.api_url);
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| MemoryError::Embedding(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MemoryError::Embedding(format!(
                "quota exceeded: API returned {status}"
            )));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let lowered = error_text.to_lowercase();
            if lowered.contains("quota") || lowered.contains("rate limit") {
                return Err(MemoryError::Embedding(format!(
                    "quota exceeded: API returned {status}: {error_text}"
                )));
            }
            return Err(MemoryError::Embedding(format!(
                "API returned {status}: {error_text}"
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::Embedding(format!("Failed to parse response: {e}")))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MemoryError::Embedding("Empty response".to_string()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_api_url() {
        let config = EmbeddingConfig {
            provider: "remote".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            RemoteEmbeddingProvider::new(&config),
            Err(MemoryError::Config(_))
        ));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let provider = RemoteEmbeddingProvider::with_endpoint(
            "http://localhost:8080/v1/",
            "m",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(provider.api_url, "http://localhost:8080/v1");
    }
}
