use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A crawled documentation page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub url: String,
    pub title: String,
    pub raw_text: String,
    pub fetched_at: DateTime<Utc>,
}

/// A window of a document's text, the unit of indexing and retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// `{source_url}#{position}`
    pub id: String,
    pub source_url: String,
    pub title: String,
    pub text: String,
    /// Sequence index within the source document
    pub position: usize,
    /// Char offset of the window start in the document text
    pub offset: usize,
}

impl Chunk {
    pub fn make_id(source_url: &str, position: usize) -> String {
        format!("{source_url}#{position}")
    }
}

/// Stable UUID for stores that only accept UUID or integer point ids.
pub fn point_id(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_id.as_bytes())
}

/// Payload stored alongside each vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkPayload {
    pub chunk_id: String,
    pub text: String,
    pub source_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub position: usize,
}

impl From<&Chunk> for ChunkPayload {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            text: chunk.text.clone(),
            source_url: chunk.source_url.clone(),
            title: chunk.title.clone(),
            position: chunk.position,
        }
    }
}

/// One vector per chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// Which lookup produced a candidate. Declaration order is merge priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Vector,
    Keyword,
}

/// A retrieval result, alive for one query
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub chunk_id: String,
    pub text: String,
    pub source_url: String,
    pub title: String,
    /// Raw score from the originating lookup (cosine or BM25)
    pub score: f32,
    pub origin: Origin,
    /// Cross-encoder relevance, set by the reranker
    pub rerank_score: Option<f32>,
}

impl Candidate {
    pub fn from_payload(payload: ChunkPayload, score: f32, origin: Origin) -> Self {
        Self {
            chunk_id: payload.chunk_id,
            text: payload.text,
            source_url: payload.source_url,
            title: payload.title,
            score,
            origin,
            rerank_score: None,
        }
    }
}

/// Chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    /// Hits taken from each lookup
    #[serde(default)]
    pub k: Option<usize>,
}

/// Chat response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_serializes_to_snake_case() {
        let json = serde_json::to_value(Origin::Keyword).unwrap();
        assert_eq!(json, "keyword");
    }

    #[test]
    fn test_point_id_is_stable() {
        let chunk = Chunk {
            id: Chunk::make_id("https://docs.example.com/a", 3),
            source_url: "https://docs.example.com/a".into(),
            title: "A".into(),
            text: "text".into(),
            position: 3,
            offset: 0,
        };
        assert_eq!(chunk.id, "https://docs.example.com/a#3");
        assert_eq!(point_id(&chunk.id), point_id("https://docs.example.com/a#3"));
        assert_ne!(point_id(&chunk.id), point_id("https://docs.example.com/a#4"));
    }

    #[test]
    fn test_chat_request_k_is_optional() {
        let req: ChatRequest = serde_json::from_str(r#"{"query": "tiers"}"#).unwrap();
        assert_eq!(req.k, None);
        let req: ChatRequest = serde_json::from_str(r#"{"query": "tiers", "k": 3}"#).unwrap();
        assert_eq!(req.k, Some(3));
    }
}
