//! Embedding provider abstraction and the offline fallback.
//!
//! The [`EmbeddingGateway`] converts chunk and query text to vectors in
//! batches, with a short inter-batch delay to respect provider rate
//! limits. When the provider is unreachable, returns a malformed payload,
//! or was never configured, the gateway falls back to a deterministic
//! hash-derived vector per text — ingestion never blocks on provider
//! availability, and the same text always maps to the same fallback
//! vector.
//!
//! Every produced vector is tagged with its [`EmbeddingOrigin`] so
//! retrieval can tell provider-confirmed vectors from fallback ones.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;
use crate::error::RagError;
use crate::models::EmbeddingOrigin;

/// A vector paired with its provenance.
#[derive(Debug, Clone)]
pub struct Embedded {
    pub vector: Vec<f32>,
    pub origin: EmbeddingOrigin,
}

/// Remote embedding backend. Implemented by the OpenAI-compatible client
/// and by test mocks.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed one batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible embeddings client (`POST {endpoint}/embeddings`).
pub struct OpenAiEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: &EmbeddingConfig, api_key: &str) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/embeddings", self.endpoint);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::ProviderUnavailable(format!("embedding request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::ProviderUnavailable(format!(
                "embedding API error {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::MalformedProviderResponse(format!("embedding payload: {e}")))?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Batched embedding front-end with the deterministic offline fallback.
pub struct EmbeddingGateway {
    client: Option<Arc<dyn EmbeddingClient>>,
    dims: usize,
    batch_size: usize,
    batch_delay: Duration,
}

impl EmbeddingGateway {
    /// Build a gateway from config and per-call credentials. Missing
    /// credentials select the fallback for all inputs rather than an
    /// error surfaced to the caller.
    pub fn new(config: &EmbeddingConfig, api_key: Option<&str>) -> Self {
        let client: Option<Arc<dyn EmbeddingClient>> = match api_key {
            Some(key) => match OpenAiEmbeddingClient::new(config, key) {
                Ok(c) => Some(Arc::new(c)),
                Err(e) => {
                    tracing::warn!("embedding client unavailable, using fallback: {e}");
                    None
                }
            },
            None => {
                tracing::debug!("no embedding credentials; fallback vectors for all inputs");
                None
            }
        };
        Self::from_parts(client, config)
    }

    /// Build a gateway around an injected client (test seam).
    pub fn with_client(client: Arc<dyn EmbeddingClient>, config: &EmbeddingConfig) -> Self {
        Self::from_parts(Some(client), config)
    }

    /// A gateway that always uses fallback vectors.
    pub fn offline(config: &EmbeddingConfig) -> Self {
        Self::from_parts(None, config)
    }

    fn from_parts(client: Option<Arc<dyn EmbeddingClient>>, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            dims: config.dims,
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed all texts, batched. Infallible: every text gets a vector,
    /// from the provider when possible and from the fallback otherwise.
    pub async fn embed_texts(&self, texts: &[String]) -> Vec<Embedded> {
        let mut result = Vec::with_capacity(texts.len());
        let batch_count = texts.chunks(self.batch_size).count();

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            result.extend(self.embed_one_batch(batch).await);
            let is_last = i + 1 == batch_count;
            if !is_last && self.client.is_some() && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        result
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Embedded {
        self.embed_one_batch(std::slice::from_ref(&text.to_string()))
            .await
            .remove(0)
    }

    async fn embed_one_batch(&self, batch: &[String]) -> Vec<Embedded> {
        if let Some(client) = &self.client {
            match client.embed_batch(batch).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    return vectors
                        .into_iter()
                        .map(|vector| Embedded {
                            vector,
                            origin: EmbeddingOrigin::Provider,
                        })
                        .collect();
                }
                Ok(vectors) => {
                    tracing::warn!(
                        expected = batch.len(),
                        got = vectors.len(),
                        "embedding batch count mismatch; falling back for batch"
                    );
                }
                Err(e) => {
                    tracing::warn!("embedding batch failed ({e}); falling back for batch");
                }
            }
        }

        batch
            .iter()
            .map(|text| Embedded {
                vector: fallback_vector(text, self.dims),
                origin: EmbeddingOrigin::Fallback,
            })
            .collect()
    }
}

/// Derive a deterministic, unit-normalized vector from text.
///
/// The bulk of the vector comes from repeated SHA-256 rounds over the
/// text; the leading slots carry lexical features (log length, whitespace
/// ratio, uppercase ratio, digit ratio) so texts with similar surface
/// shape share some signal. Pure: no I/O, no randomness.
pub fn fallback_vector(text: &str, dims: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(dims);
    let mut counter: u32 = 0;
    while values.len() < dims {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        for byte in hasher.finalize() {
            if values.len() == dims {
                break;
            }
            values.push(byte as f32 / 255.0 - 0.5);
        }
        counter += 1;
    }

    let total = text.chars().count().max(1) as f32;
    let whitespace = text.chars().filter(|c| c.is_whitespace()).count() as f32;
    let uppercase = text.chars().filter(|c| c.is_uppercase()).count() as f32;
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count() as f32;
    let features = [
        total.ln_1p() / 10.0,
        whitespace / total,
        uppercase / total,
        digits / total,
    ];
    for (slot, feature) in values.iter_mut().zip(features) {
        *slot = feature;
    }

    l2_normalize(&mut values);
    values
}

fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in values.iter_mut() {
            *v /= norm;
        }
    } else if let Some(first) = values.first_mut() {
        *first = 1.0;
    }
}

/// Cosine similarity between two vectors. Returns `0.0` for empty or
/// mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingClient;

    #[async_trait]
    impl EmbeddingClient for FailingClient {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Err(RagError::ProviderUnavailable("down".to_string()))
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct ShortClient;

    #[async_trait]
    impl EmbeddingClient for ShortClient {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            // One vector short: malformed for the whole batch
            Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
        }
        fn model_name(&self) -> &str {
            "short"
        }
    }

    fn config(dims: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            dims,
            batch_size: 2,
            batch_delay_ms: 0,
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_fallback_deterministic() {
        let a = fallback_vector("hello world", 64);
        let b = fallback_vector("hello world", 64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_distinct_texts_differ() {
        let a = fallback_vector("hello world", 64);
        let b = fallback_vector("goodbye world", 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fallback_unit_norm() {
        let v = fallback_vector("some text with Digits 123", 128);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm = {norm}");
        assert_eq!(v.len(), 128);
    }

    #[test]
    fn test_fallback_identical_text_cosine_one() {
        let a = fallback_vector("same", 64);
        let b = fallback_vector("same", 64);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_offline_gateway_uses_fallback() {
        let gateway = EmbeddingGateway::offline(&config(32));
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let embedded = gateway.embed_texts(&texts).await;
        assert_eq!(embedded.len(), 3);
        for e in &embedded {
            assert_eq!(e.origin, EmbeddingOrigin::Fallback);
            assert_eq!(e.vector.len(), 32);
        }
        assert_eq!(embedded[0].vector, fallback_vector("a", 32));
    }

    #[tokio::test]
    async fn test_failed_provider_falls_back_per_batch() {
        let gateway = EmbeddingGateway::with_client(Arc::new(FailingClient), &config(16));
        let texts = vec!["x".to_string(), "y".to_string()];
        let embedded = gateway.embed_texts(&texts).await;
        assert!(embedded.iter().all(|e| e.origin == EmbeddingOrigin::Fallback));
    }

    #[tokio::test]
    async fn test_count_mismatch_treated_as_malformed() {
        let gateway = EmbeddingGateway::with_client(Arc::new(ShortClient), &config(16));
        let texts = vec!["x".to_string(), "y".to_string()];
        let embedded = gateway.embed_texts(&texts).await;
        assert_eq!(embedded.len(), 2);
        assert!(embedded.iter().all(|e| e.origin == EmbeddingOrigin::Fallback));
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
