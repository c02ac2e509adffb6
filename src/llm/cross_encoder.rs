//! Cross-encoder reranker via OpenAI-compatible `/v1/rerank` endpoint.
//!
//! One request scores every candidate for a query; the server returns results in
//! relevance order, which are mapped back to candidate order here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RerankerConfig;
use crate::error::{Error, Result};
use crate::llm::{error_body, send_with_retry};
use crate::rerank::Reranker;

pub struct CrossEncoderReranker {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: std::time::Duration,
}

impl CrossEncoderReranker {
    /// Returns None when no reranker endpoint is configured.
    pub fn from_config(client: reqwest::Client, config: &RerankerConfig) -> Option<Self> {
        let base_url = config.base_url.as_deref()?;
        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.as_deref().unwrap_or("default").to_string(),
            timeout: std::time::Duration::from_secs(config.timeout_secs.min(30)),
        })
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    /// Score every document against the query. Scores are returned in document order,
    /// sigmoid-normalized to 0.0 - 1.0.
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/rerank", self.base_url);

        let req_body = RerankRequest {
            model: self.model.clone(),
            query: query.to_string(),
            documents: documents.to_vec(),
            top_n: documents.len(),
        };

        let resp = send_with_retry(self.client.post(&url).timeout(self.timeout).json(&req_body))
            .await
            .map_err(|e| Error::reranker(format!("Failed to reach reranker endpoint: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::reranker(format!(
                "Reranker returned {}",
                error_body(resp).await
            )));
        }

        let body: RerankResponse = resp
            .json()
            .await
            .map_err(|e| Error::reranker(format!("Failed to parse reranker response: {e}")))?;

        scores_in_document_order(body.results, documents.len())
    }
}

/// Place each result's score at its document index. Every document must be scored.
fn scores_in_document_order(results: Vec<RerankResultRaw>, len: usize) -> Result<Vec<f32>> {
    let mut scores: Vec<Option<f32>> = vec![None; len];
    for r in results {
        match scores.get_mut(r.index) {
            Some(slot) => *slot = Some(sigmoid(r.relevance_score)),
            None => {
                return Err(Error::reranker(format!(
                    "Reranker returned out-of-range index {}",
                    r.index
                )))
            }
        }
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| Error::reranker(format!("No score for document {i}"))))
        .collect()
}

/// Sigmoid normalization: maps raw logits to 0-1 range.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// ─── Request/Response types ────────────────────────────

#[derive(Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultRaw>,
}

#[derive(Deserialize)]
struct RerankResultRaw {
    index: usize,
    relevance_score: f32,
}
