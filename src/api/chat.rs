use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::error::Error;
use crate::models::{ChatRequest, ChatResponse};
use crate::state::AppState;

/// POST /chat: answer a documentation question with cited sources.
///
/// Stateless: every request runs retrieve → rerank → answer from scratch.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, Error> {
    let Json(req) = payload.map_err(|e| Error::invalid_input(e.body_text()))?;
    let response = state.pipeline.chat(&req).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::{AnswerGenerator, INSUFFICIENT_INFORMATION};
    use crate::config::Config;
    use crate::error::Result;
    use crate::llm::embeddings::Embedder;
    use crate::llm::generate::Generator;
    use crate::models::{ChunkPayload, EmbeddingRecord};
    use crate::pipeline::ChatPipeline;
    use crate::search::hybrid::HybridRetriever;
    use crate::search::{KeywordIndex, KeywordIndexWriter, ScoredChunk, Staging, VectorStore};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FlatEmbedder;

    #[async_trait]
    impl Embedder for FlatEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Returns its hits for every query.
    struct CannedVectors(Vec<ScoredChunk>);

    #[async_trait]
    impl VectorStore for CannedVectors {
        fn name(&self) -> &'static str {
            "canned"
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
        async fn search(&self, _v: &[f32], limit: usize, _m: Option<f32>) -> Result<Vec<ScoredChunk>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.0.len())
        }
    }

    struct NoKeywords;

    impl KeywordIndex for NoKeywords {
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

    struct ScriptedGenerator(Option<&'static str>);

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| Error::generation("upstream timed out"))
        }
    }

    fn hit(url: &str) -> ScoredChunk {
        ScoredChunk {
            payload: ChunkPayload {
                chunk_id: format!("{url}#0"),
                text: "Tiers group members by annual spend.".to_string(),
                source_url: url.to_string(),
                title: "Tiers".to_string(),
                position: 0,
            },
            score: 0.8,
        }
    }

    fn app(hits: Vec<ScoredChunk>, reply: Option<&'static str>) -> axum::Router {
        let config = Config::default();
        let retriever = HybridRetriever::new(
            Arc::new(FlatEmbedder),
            Arc::new(CannedVectors(hits)),
            Arc::new(NoKeywords),
        );
        let pipeline = ChatPipeline::new(
            retriever,
            None,
            AnswerGenerator::new(Arc::new(ScriptedGenerator(reply))),
            &config.retrieval,
        );
        crate::api::router(AppState::with_pipeline(config, pipeline))
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_answer_with_sources() {
        let resp = app(vec![hit("https://docs.example.com/tiers")], Some("Tiers rank members."))
            .oneshot(post(r#"{"query": "What are tiers?"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body: ChatResponse = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(body.answer, "Tiers rank members.");
        assert_eq!(body.sources, vec!["https://docs.example.com/tiers".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_retrieval_gives_fixed_answer() {
        let resp = app(Vec::new(), None)
            .oneshot(post(r#"{"query": "zxqv blorf"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["answer"], INSUFFICIENT_INFORMATION);
        assert_eq!(body["sources"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_malformed_requests_rejected() {
        for body in [
            "not json",
            r#"{"k": 3}"#,
            r#"{"query": "   "}"#,
            r#"{"query": "tiers", "k": 0}"#,
            r#"{"query": "tiers", "k": "many"}"#,
        ] {
            let resp = app(Vec::new(), None).oneshot(post(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert!(body_json(resp).await["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_generation_failure_is_bad_gateway() {
        let resp = app(vec![hit("https://docs.example.com/tiers")], None)
            .oneshot(post(r#"{"query": "What are tiers?"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_index_page_served() {
        let resp = app(Vec::new(), None)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
