use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MemoryError, Result};

/// Environment variable consulted when `hot.redis_url` is not configured
pub const REDIS_URL_ENV: &str = "REDIS_URL";

/// Main configuration structure for recollect
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Hot tier (recency buffer) configuration
    #[serde(default)]
    pub hot: HotConfig,
    /// Cold tier (vector store) configuration
    #[serde(default)]
    pub cold: ColdConfig,
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Recall policy
    #[serde(default)]
    pub recall: RecallConfig,
}

/// Hot tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotConfig {
    /// Maximum entries kept per conversation key
    #[serde(default = "default_hot_limit")]
    pub limit: usize,
    /// Seconds a key survives without a push
    #[serde(default = "default_hot_ttl_secs")]
    pub ttl_secs: u64,
    /// Prefix for backing-store keys (`{prefix}:{conversation_key}:messages`)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Per-call timeout in milliseconds
    #[serde(default = "default_hot_timeout_ms")]
    pub timeout_ms: u64,
    /// Redis URL; when absent the in-process backend is used
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl Default for HotConfig {
    fn default() -> Self {
        Self {
            limit: default_hot_limit(),
            ttl_secs: default_hot_ttl_secs(),
            key_prefix: default_key_prefix(),
            timeout_ms: default_hot_timeout_ms(),
            redis_url: None,
        }
    }
}

impl HotConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_hot_limit() -> usize {
    20
}

fn default_hot_ttl_secs() -> u64 {
    86_400
}

fn default_key_prefix() -> String {
    "conversation".to_string()
}

fn default_hot_timeout_ms() -> u64 {
    5_000
}

/// Cold tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdConfig {
    /// Directory holding the LanceDB dataset
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Table name for memory records
    #[serde(default = "default_table")]
    pub table: String,
    /// Minimum cosine similarity for a query hit
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Maximum hits returned per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Candidate pool size as a multiple of `max_results`
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Per-call timeout in milliseconds
    #[serde(default = "default_cold_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ColdConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            table: default_table(),
            similarity_threshold: default_similarity_threshold(),
            max_results: default_max_results(),
            candidate_multiplier: default_candidate_multiplier(),
            timeout_ms: default_cold_timeout_ms(),
        }
    }
}

impl ColdConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".recollect"))
        .unwrap_or_else(|| PathBuf::from(".recollect"))
}

fn default_table() -> String {
    "memories".to_string()
}

fn default_similarity_threshold() -> f32 {
    0.7
}

fn default_max_results() -> usize {
    10
}

fn default_candidate_multiplier() -> usize {
    3
}

fn default_cold_timeout_ms() -> u64 {
    30_000
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider type: local or remote
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Model name (fastembed model for local, API model id for remote)
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding dimension every stored vector must have
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    /// Provider input limit in tokens
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
    /// Explicit character budget; defaults to `token_limit * 4`
    #[serde(default)]
    pub max_input_chars: Option<usize>,
    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// API endpoint base URL for the remote provider
    #[serde(default)]
    pub api_url: String,
    /// Environment variable name for the remote API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            token_limit: default_token_limit(),
            max_input_chars: None,
            timeout_secs: default_embedding_timeout_secs(),
            api_url: String::new(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl EmbeddingConfig {
    /// Character budget applied before calling the provider
    pub fn effective_max_input_chars(&self) -> usize {
        self.max_input_chars.unwrap_or(self.token_limit * 4)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}

fn default_embedding_model() -> String {
    "multilingual-e5-base".to_string()
}

fn default_embedding_dimension() -> usize {
    768
}

fn default_token_limit() -> usize {
    2048
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_api_key_env() -> String {
    "EMBEDDING_API_KEY".to_string()
}

/// Recall policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecallConfig {
    /// Permit cold queries that span every conversation
    #[serde(default)]
    pub allow_global: bool,
}

impl Config {
    /// Parse a TOML document; missing sections and fields take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MemoryError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load from an explicit path, or the first default location that exists
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::read_file(path)?,
            None => {
                let default_paths = [
                    dirs::home_dir().map(|h| h.join(".recollect").join("config.toml")),
                    dirs::config_dir().map(|c| c.join("recollect").join("config.toml")),
                    Some(PathBuf::from("config.toml")),
                ];

                match default_paths.iter().flatten().find(|p| p.exists()) {
                    Some(path) => Self::read_file(path)?,
                    None => {
                        tracing::info!("No config file found, using defaults");
                        Config::default()
                    }
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        tracing::info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Fill unset connection settings from the environment
    pub fn apply_env_overrides(&mut self) {
        if self.hot.redis_url.is_none() {
            if let Ok(url) = std::env::var(REDIS_URL_ENV) {
                if !url.is_empty() {
                    self.hot.redis_url = Some(url);
                }
            }
        }
    }

    /// Reject settings that would break tier invariants
    pub fn validate(&self) -> Result<()> {
        if self.hot.limit == 0 {
            return Err(MemoryError::Config("hot.limit must be at least 1".to_string()));
        }
        if self.hot.ttl_secs == 0 {
            return Err(MemoryError::Config("hot.ttl_secs must be at least 1".to_string()));
        }
        if self.embedding.dimension == 0 {
            return Err(MemoryError::Config(
                "embedding.dimension must be at least 1".to_string(),
            ));
        }
        if self.embedding.effective_max_input_chars() == 0 {
            return Err(MemoryError::Config(
                "embedding input budget must be at least 1 character".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cold.similarity_threshold) {
            return Err(MemoryError::Config(format!(
                "cold.similarity_threshold must be within [0, 1], got {}",
                self.cold.similarity_threshold
            )));
        }
        if self.cold.max_results == 0 {
            return Err(MemoryError::Config(
                "cold.max_results must be at least 1".to_string(),
            ));
        }
        if self.cold.candidate_multiplier == 0 {
            return Err(MemoryError::Config(
                "cold.candidate_multiplier must be at least 1".to_string(),
            ));
        }
        match self.embedding.provider.as_str() {
            "local" | "remote" => Ok(()),
            other => Err(MemoryError::Config(format!(
                "Unknown embedding provider: {other}"
            ))),
        }
    }
}
