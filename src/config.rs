//! TOML configuration for the answering core.
//!
//! Every tunable has a serde default so a config file only needs to name
//! the values it overrides. `load_config` validates cross-field rules on
//! load; `Config::default()` is usable directly in tests and embedded
//! callers.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters for raw-text mode.
    #[serde(default = "default_target_size")]
    pub target_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
        }
    }
}

fn default_target_size() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between provider batches, to stay under rate limits.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            endpoint: default_embedding_endpoint(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    20
}
fn default_batch_delay_ms() -> u64 {
    200
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Advisory cost rates in USD per million tokens.
    #[serde(default = "default_prompt_rate")]
    pub prompt_rate_per_million: f64,
    #[serde(default = "default_completion_rate")]
    pub completion_rate_per_million: f64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            endpoint: default_embedding_endpoint(),
            timeout_secs: default_completion_timeout_secs(),
            max_tokens: default_max_tokens(),
            prompt_rate_per_million: default_prompt_rate(),
            completion_rate_per_million: default_completion_rate(),
        }
    }
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    60
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_prompt_rate() -> f64 {
    0.15
}
fn default_completion_rate() -> f64 {
    0.60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidates scoring below this are dropped as noise.
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f32,
    /// Top-k for simple/factual questions.
    #[serde(default = "default_top_k_simple")]
    pub top_k_simple: usize,
    /// Top-k for open-ended questions.
    #[serde(default = "default_top_k_open")]
    pub top_k_open: usize,
    /// Chunk cap for the unranked raw fallback (cascade level 2).
    #[serde(default = "default_raw_fallback_max_chunks")]
    pub raw_fallback_max_chunks: usize,
    /// Character cap for the direct-content fallback (cascade level 3).
    #[serde(default = "default_direct_fallback_max_chars")]
    pub direct_fallback_max_chars: usize,
    /// Source excerpt length in answer citations.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    #[serde(default = "default_exact_phrase_weight")]
    pub exact_phrase_weight: f32,
    #[serde(default = "default_pair_phrase_weight")]
    pub pair_phrase_weight: f32,
    #[serde(default = "default_header_weight")]
    pub header_weight: f32,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,
    /// Chunk length (chars) at which the damping factor halves a score.
    #[serde(default = "default_length_damping_chars")]
    pub length_damping_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            relevance_floor: default_relevance_floor(),
            top_k_simple: default_top_k_simple(),
            top_k_open: default_top_k_open(),
            raw_fallback_max_chunks: default_raw_fallback_max_chunks(),
            direct_fallback_max_chars: default_direct_fallback_max_chars(),
            excerpt_chars: default_excerpt_chars(),
            exact_phrase_weight: default_exact_phrase_weight(),
            pair_phrase_weight: default_pair_phrase_weight(),
            header_weight: default_header_weight(),
            keyword_weight: default_keyword_weight(),
            length_damping_chars: default_length_damping_chars(),
        }
    }
}

fn default_relevance_floor() -> f32 {
    0.05
}
fn default_top_k_simple() -> usize {
    8
}
fn default_top_k_open() -> usize {
    4
}
fn default_raw_fallback_max_chunks() -> usize {
    20
}
fn default_direct_fallback_max_chars() -> usize {
    8000
}
fn default_excerpt_chars() -> usize {
    200
}
fn default_exact_phrase_weight() -> f32 {
    0.5
}
fn default_pair_phrase_weight() -> f32 {
    0.25
}
fn default_header_weight() -> f32 {
    0.4
}
fn default_keyword_weight() -> f32 {
    0.1
}
fn default_length_damping_chars() -> usize {
    4000
}

/// Per-call credentials for the external providers. Supplied by the
/// caller of `ingest`/`answer`; absence triggers the configured fallback
/// paths rather than an error.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
}

impl ProviderCredentials {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.target_size == 0 {
        anyhow::bail!("chunking.target_size must be > 0");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if !(0.0..=1.0).contains(&config.retrieval.relevance_floor) {
        anyhow::bail!("retrieval.relevance_floor must be in [0.0, 1.0]");
    }
    if config.retrieval.top_k_simple == 0 || config.retrieval.top_k_open == 0 {
        anyhow::bail!("retrieval.top_k_simple and top_k_open must be >= 1");
    }

    Ok(config)
}
