//! Cross-encoder reranking of merged retrieval candidates.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::Candidate;

/// Joint (query, passage) relevance scoring.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score each document against the query. The result is parallel with `documents`.
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

/// Score candidates with `reranker` and keep the best `top_n`.
pub async fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    candidates: Vec<Candidate>,
    top_n: usize,
) -> Result<Vec<Candidate>> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let documents: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let scores = reranker.score(query, &documents).await?;
    if scores.len() != candidates.len() {
        return Err(Error::reranker(format!(
            "Expected {} scores, got {}",
            candidates.len(),
            scores.len()
        )));
    }

    Ok(order_by_scores(candidates, &scores, top_n))
}

/// Sort descending by score and truncate. The sort is stable, so equal scores keep
/// retrieval order.
pub fn order_by_scores(candidates: Vec<Candidate>, scores: &[f32], top_n: usize) -> Vec<Candidate> {
    let mut scored: Vec<Candidate> = candidates
        .into_iter()
        .zip(scores.iter().copied())
        .map(|(mut c, s)| {
            c.rerank_score = Some(s);
            c
        })
        .collect();

    scored.sort_by(|a, b| {
        let a = a.rerank_score.unwrap_or(f32::NEG_INFINITY);
        let b = b.rerank_score.unwrap_or(f32::NEG_INFINITY);
        b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_n);
    scored
}
