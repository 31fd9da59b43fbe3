use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::completion::RetryPolicy;
use crate::config::{EmbeddingBackend, EmbeddingConfig, ProviderConfig, RequestConfig};
use crate::error::{EmbeddingError, EmbeddingResult};

/// Sentence embedding backend.
///
/// Each returned vector is unit-normalized and depends only on its own input
/// string, never on batch composition or position.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded in reports
    fn model_id(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;
}

/// Build the configured embedder
pub fn build_embedder(
    embedding: &EmbeddingConfig,
    provider: &ProviderConfig,
    request: &RequestConfig,
) -> EmbeddingResult<Arc<dyn Embedder>> {
    match embedding.backend {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(embedding.dimensions))),
        EmbeddingBackend::Remote => Ok(Arc::new(RemoteEmbedder::new(
            embedding, provider, request,
        )?)),
    }
}

/// Dot product of two unit vectors
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    left.iter()
        .zip(right.iter())
        .map(|(l, r)| f64::from(*l) * f64::from(*r))
        .sum::<f64>()
}

/// Scale to unit length in place; zero vectors are left unchanged
pub fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    for value in values {
        *value /= norm;
    }
}

// ============================================================================
// Local feature hashing
// ============================================================================

/// Deterministic offline embedder over hashed unigram and bigram features
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(8);
        Self {
            dimensions,
            model_id: format!("hashing-{}", dimensions),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0_f32; self.dimensions];

        for feature in features(text) {
            let hash = stable_hash(&feature);
            let index = (hash as usize) % self.dimensions;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
            vector[index] += sign * weight;
        }

        normalize_vector(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn stable_hash(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn features(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    let mut out = Vec::with_capacity(words.len() * 2);
    for (i, word) in words.iter().enumerate() {
        out.push(format!("w:{}", word));
        if let Some(next) = words.get(i + 1) {
            out.push(format!("b:{}_{}", word, next));
        }
    }
    out
}

// ============================================================================
// Remote OpenAI-compatible embeddings
// ============================================================================

/// Client for an OpenAI-compatible `/embeddings` endpoint
#[derive(Clone)]
pub struct RemoteEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    batch_size: usize,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct EmbeddingApiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    pub fn new(
        embedding: &EmbeddingConfig,
        provider: &ProviderConfig,
        request: &RequestConfig,
    ) -> EmbeddingResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request.timeout_ms))
            .build()
            .map_err(EmbeddingError::Http)?;

        Ok(Self {
            client,
            base_url: embedding.base_url.trim_end_matches('/').to_string(),
            api_key: provider.api_key.clone(),
            model: embedding.model.clone(),
            batch_size: embedding.batch_size.max(1),
            retry: RetryPolicy::from_config(request),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request_batch(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if self.retry.should_retry(attempt) && is_retryable(&e) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        model = %self.model,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying embedding request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_batch(&self, batch: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        debug!(model = %self.model, inputs = batch.len(), "Requesting embeddings");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&EmbeddingApiRequest {
                model: &self.model,
                input: batch,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingApiResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse {
                    message: format!("Failed to parse embeddings: {}", e),
                })?;

        order_by_index(parsed.data, batch.len())
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

fn is_retryable(error: &EmbeddingError) -> bool {
    match error {
        EmbeddingError::Api { status, .. } => *status == 429 || *status >= 500,
        EmbeddingError::Http(_) => true,
        EmbeddingError::InvalidResponse { .. } => false,
    }
}

/// Place vectors by their response index and normalize each
fn order_by_index(data: Vec<EmbeddingDatum>, expected: usize) -> EmbeddingResult<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(EmbeddingError::InvalidResponse {
            message: format!("expected {} embeddings, got {}", expected, data.len()),
        });
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for datum in data {
        let slot = slots
            .get_mut(datum.index)
            .ok_or_else(|| EmbeddingError::InvalidResponse {
                message: format!("embedding index {} out of range", datum.index),
            })?;
        let mut vector = datum.embedding;
        normalize_vector(&mut vector);
        *slot = Some(vector);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or_else(|| EmbeddingError::InvalidResponse {
                message: format!("missing embedding for input {}", i),
            })
        })
        .collect()
}
