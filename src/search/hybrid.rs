use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::embeddings::Embedder;
use crate::models::{Candidate, Origin};
use crate::search::{KeywordIndex, ScoredChunk, VectorStore};

/// Union of two hit lists, deduplicated by chunk id.
///
/// Vector hits come first in their own rank order, followed by keyword hits not
/// already present. When both lookups return a chunk, the vector hit is kept.
pub fn merge_candidates(vector_hits: Vec<Candidate>, keyword_hits: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(vector_hits.len() + keyword_hits.len());
    let mut merged = Vec::with_capacity(vector_hits.len() + keyword_hits.len());

    for candidate in vector_hits.into_iter().chain(keyword_hits) {
        if seen.insert(candidate.chunk_id.clone()) {
            merged.push(candidate);
        }
    }
    merged
}

/// Output of one hybrid lookup.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub candidates: Vec<Candidate>,
    pub vector_hits: usize,
    pub keyword_hits: usize,
}

/// Runs the vector and keyword lookups concurrently and merges their results.
///
/// A lookup that exceeds `lookup_timeout` contributes nothing; a lookup that fails
/// fails the whole retrieval.
pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    keywords: Arc<dyn KeywordIndex>,
    min_vector_score: Option<f32>,
    lookup_timeout: Duration,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        keywords: Arc<dyn KeywordIndex>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            keywords,
            min_vector_score: None,
            lookup_timeout: Duration::from_secs(10),
        }
    }

    /// Drop vector hits scoring below `score`. Non-positive values disable the filter.
    pub fn with_min_vector_score(mut self, score: f32) -> Self {
        self.min_vector_score = (score > 0.0).then_some(score);
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Retrieval> {
        if k == 0 {
            return Ok(Retrieval {
                candidates: Vec::new(),
                vector_hits: 0,
                keyword_hits: 0,
            });
        }

        let vector_lookup = async {
            let embedding = self.embedder.embed(query).await?;
            self.vectors.search(&embedding, k, self.min_vector_score).await
        };

        let keyword_lookup = {
            let keywords = self.keywords.clone();
            let query = query.to_string();
            async move {
                tokio::task::spawn_blocking(move || keywords.search(&query, k))
                    .await
                    .map_err(|e| Error::KeywordIndex(format!("Keyword lookup task failed: {e}")))?
            }
        };

        let (vector_result, keyword_result) = tokio::join!(
            tokio::time::timeout(self.lookup_timeout, vector_lookup),
            tokio::time::timeout(self.lookup_timeout, keyword_lookup),
        );

        let vector_hits = match vector_result {
            Ok(hits) => hits?,
            Err(_) => {
                tracing::warn!(
                    "Vector lookup timed out after {:?}, continuing without it",
                    self.lookup_timeout
                );
                Vec::new()
            }
        };
        let keyword_hits = match keyword_result {
            Ok(hits) => hits?,
            Err(_) => {
                tracing::warn!(
                    "Keyword lookup timed out after {:?}, continuing without it",
                    self.lookup_timeout
                );
                Vec::new()
            }
        };

        let vector_count = vector_hits.len();
        let keyword_count = keyword_hits.len();
        let candidates = merge_candidates(
            to_candidates(vector_hits, Origin::Vector),
            to_candidates(keyword_hits, Origin::Keyword),
        );

        Ok(Retrieval {
            candidates,
            vector_hits: vector_count,
            keyword_hits: keyword_count,
        })
    }
}

fn to_candidates(hits: Vec<ScoredChunk>, origin: Origin) -> Vec<Candidate> {
    hits.into_iter()
        .map(|hit| Candidate::from_payload(hit.payload, hit.score, origin))
        .collect()
}
