//! Automatic metrics comparing a method's rewrite against the gold rewrite.
//!
//! Lexical scores are pure functions of the two strings. Embedding scores
//! come from an [`Embedder`], which is either a remote OpenAI-compatible
//! endpoint or a deterministic local hashing model.

mod embedding;
mod lexical;

pub use embedding::{
    build_embedder, cosine_similarity, normalize_vector, Embedder, HashingEmbedder,
    RemoteEmbedder,
};
pub use lexical::{lcs_fmeasure, lcs_length, lexical_overlap, stemmed_tokens, tokenize};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::protocol::{ExampleId, Method, Record};

/// Metric triple for one (gold, hypothesis) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    pub lexical_overlap: f64,
    pub lcs_fmeasure: f64,
    pub embedding_cosine: f64,
}

/// Scores for one method's output on one example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub example_id: ExampleId,
    pub method: Method,
    #[serde(flatten)]
    pub scores: MetricScores,
}

/// Computes all automatic metrics
#[derive(Clone)]
pub struct ScoringEngine {
    embedder: Arc<dyn Embedder>,
}

impl ScoringEngine {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn embedder_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Score a single pair
    pub async fn score(&self, gold: &str, hypothesis: &str) -> EmbeddingResult<MetricScores> {
        let vectors = self
            .embedder
            .embed(&[gold.to_string(), hypothesis.to_string()])
            .await?;
        let [gold_vec, hyp_vec] = vectors.as_slice() else {
            return Err(EmbeddingError::InvalidResponse {
                message: format!("expected 2 embeddings, got {}", vectors.len()),
            });
        };

        Ok(lexical_scores(gold, hypothesis, cosine_similarity(gold_vec, hyp_vec)))
    }

    /// Score every complete record under every method.
    ///
    /// Gold rewrites are embedded once and shared across methods.
    pub async fn score_records(&self, records: &[Record]) -> EmbeddingResult<Vec<MetricRow>> {
        let records: Vec<&Record> = records.iter().filter(|r| r.is_complete()).collect();
        let golds: Vec<String> = records.iter().map(|r| r.gold_rewrite.clone()).collect();
        let gold_vectors = self.embed_exact(&golds).await?;

        let mut rows = Vec::with_capacity(records.len() * Method::ALL.len());
        for method in Method::ALL {
            let hypotheses: Vec<String> = records
                .iter()
                .map(|r| r.output(method).map(|o| o.rewrite.clone()).unwrap_or_default())
                .collect();
            let hyp_vectors = self.embed_exact(&hypotheses).await?;

            for (i, record) in records.iter().enumerate() {
                let cosine = cosine_similarity(&gold_vectors[i], &hyp_vectors[i]);
                rows.push(MetricRow {
                    example_id: record.example_id.clone(),
                    method,
                    scores: lexical_scores(&golds[i], &hypotheses[i], cosine),
                });
            }
        }

        info!(
            records = records.len(),
            rows = rows.len(),
            embedder = %self.embedder.model_id(),
            "Scored records"
        );
        Ok(rows)
    }

    async fn embed_exact(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let vectors = self.embedder.embed(texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse {
                message: format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            });
        }
        Ok(vectors)
    }
}

fn lexical_scores(gold: &str, hypothesis: &str, embedding_cosine: f64) -> MetricScores {
    MetricScores {
        lexical_overlap: lexical_overlap(gold, hypothesis),
        lcs_fmeasure: lcs_fmeasure(gold, hypothesis),
        embedding_cosine,
    }
}
