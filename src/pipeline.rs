//! Query-time flow: validate, retrieve, rerank, answer.

use std::sync::Arc;
use std::time::Instant;

use crate::answer::AnswerGenerator;
use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::models::{ChatRequest, ChatResponse};
use crate::rerank::{self, Reranker};
use crate::search::hybrid::HybridRetriever;

pub const MAX_QUERY_CHARS: usize = 2000;

pub struct ChatPipeline {
    retriever: HybridRetriever,
    reranker: Option<Arc<dyn Reranker>>,
    answers: AnswerGenerator,
    default_k: usize,
    max_k: usize,
    top_n: usize,
}

impl ChatPipeline {
    pub fn new(
        retriever: HybridRetriever,
        reranker: Option<Arc<dyn Reranker>>,
        answers: AnswerGenerator,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            reranker,
            answers,
            default_k: retrieval.default_k,
            max_k: retrieval.max_k,
            top_n: retrieval.top_n,
        }
    }

    /// Trimmed query and effective k, or `InvalidInput`.
    pub fn validate(&self, req: &ChatRequest) -> Result<(String, usize)> {
        let query = req.query.trim();
        if query.is_empty() {
            return Err(Error::invalid_input("Query is required"));
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(Error::invalid_input(format!(
                "Query must be at most {MAX_QUERY_CHARS} characters"
            )));
        }

        let k = req.k.unwrap_or(self.default_k);
        if k == 0 || k > self.max_k {
            return Err(Error::invalid_input(format!(
                "k must be between 1 and {}",
                self.max_k
            )));
        }
        Ok((query.to_string(), k))
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let (query, k) = self.validate(req)?;
        let started = Instant::now();

        let retrieval = self.retriever.retrieve(&query, k).await?;
        let retrieve_ms = started.elapsed().as_millis() as u64;

        let rerank_started = Instant::now();
        let contexts = match &self.reranker {
            Some(reranker) => {
                rerank::rerank(reranker.as_ref(), &query, retrieval.candidates, self.top_n).await?
            }
            None => {
                let mut candidates = retrieval.candidates;
                candidates.truncate(self.top_n);
                candidates
            }
        };
        let rerank_ms = rerank_started.elapsed().as_millis() as u64;

        let generate_started = Instant::now();
        let response = self.answers.answer(&query, &contexts).await?;

        tracing::info!(
            k,
            vector_hits = retrieval.vector_hits,
            keyword_hits = retrieval.keyword_hits,
            contexts = contexts.len(),
            sources = response.sources.len(),
            retrieve_ms,
            rerank_ms,
            generate_ms = generate_started.elapsed().as_millis() as u64,
            total_ms = started.elapsed().as_millis() as u64,
            "Answered chat query"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::embeddings::Embedder;
    use crate::llm::generate::Generator;
    use crate::models::EmbeddingRecord;
    use crate::search::{KeywordIndex, KeywordIndexWriter, ScoredChunk, Staging, VectorStore};
    use async_trait::async_trait;

    struct NoopEmbedder;

    #[async_trait]
    impl Embedder for NoopEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    struct EmptyVectors;

    #[async_trait]
    impl VectorStore for EmptyVectors {
        fn name(&self) -> &'static str {
            "empty"
        }
        async fn prepare(&self, _dimensions: usize) -> Result<Staging> {
            Ok(Staging("s".into()))
        }
        async fn upsert(&self, _staging: &Staging, _records: &[EmbeddingRecord]) -> Result<()> {
            Ok(())
        }
        async fn publish(&self, _staging: Staging) -> Result<()> {
            Ok(())
        }
        async fn discard(&self, _staging: Staging) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _v: &[f32], _l: usize, _m: Option<f32>) -> Result<Vec<ScoredChunk>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    struct EmptyKeywords;

    impl KeywordIndex for EmptyKeywords {
        fn stage(&self) -> Result<Box<dyn KeywordIndexWriter>> {
            Err(Error::KeywordIndex("read-only".into()))
        }
        fn search(&self, _query: &str, _limit: usize) -> Result<Vec<ScoredChunk>> {
            Ok(Vec::new())
        }
        fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    struct PanickingGenerator;

    #[async_trait]
    impl Generator for PanickingGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            panic!("generation must not run without context");
        }
    }

    fn pipeline() -> ChatPipeline {
        let retriever = HybridRetriever::new(
            Arc::new(NoopEmbedder),
            Arc::new(EmptyVectors),
            Arc::new(EmptyKeywords),
        );
        ChatPipeline::new(
            retriever,
            None,
            AnswerGenerator::new(Arc::new(PanickingGenerator)),
            &RetrievalConfig::default(),
        )
    }

    fn request(query: &str, k: Option<usize>) -> ChatRequest {
        ChatRequest {
            query: query.to_string(),
            k,
        }
    }

    #[test]
    fn test_validate_trims_and_defaults_k() {
        let (query, k) = pipeline().validate(&request("  tiers  ", None)).unwrap();
        assert_eq!(query, "tiers");
        assert_eq!(k, 8);
    }

    #[test]
    fn test_validate_rejects_blank_query() {
        let err = pipeline().validate(&request("   ", None)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_validate_rejects_out_of_range_k() {
        let p = pipeline();
        assert!(p.validate(&request("tiers", Some(0))).is_err());
        assert!(p.validate(&request("tiers", Some(51))).is_err());
        assert!(p.validate(&request("tiers", Some(50))).is_ok());
    }

    #[test]
    fn test_validate_rejects_long_query() {
        let long = "é".repeat(MAX_QUERY_CHARS + 1);
        assert!(pipeline().validate(&request(&long, None)).is_err());
        let max = "é".repeat(MAX_QUERY_CHARS);
        assert!(pipeline().validate(&request(&max, None)).is_ok());
    }

    #[tokio::test]
    async fn test_nothing_retrieved_gives_fixed_answer() {
        let resp = pipeline().chat(&request("zxqv", None)).await.unwrap();
        assert_eq!(resp.answer, crate::answer::INSUFFICIENT_INFORMATION);
        assert!(resp.sources.is_empty());
    }
}
