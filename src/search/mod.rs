//! Retrieval indices and the hybrid retriever on top of them.
//!
//! Both indices are rebuilt from scratch by the indexing job and published atomically:
//! a build is staged, filled, then swapped in, so readers see either the previous
//! complete index or the new complete index.

pub mod bm25;
pub mod hybrid;
pub mod qdrant;
pub mod vector;
pub mod versioned;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkPayload, EmbeddingRecord};

/// A payload with the score its lookup assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub payload: ChunkPayload,
    pub score: f32,
}

/// Handle to an unpublished vector collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staging(pub String);

/// Nearest-neighbour store over chunk embeddings (cosine similarity).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Create an empty collection for a rebuild. Nothing is visible to `search` yet.
    async fn prepare(&self, dimensions: usize) -> Result<Staging>;

    /// Insert or replace records by chunk id.
    async fn upsert(&self, staging: &Staging, records: &[EmbeddingRecord]) -> Result<()>;

    /// Make the staged collection the live one.
    async fn publish(&self, staging: Staging) -> Result<()>;

    /// Drop a staged collection without publishing it.
    async fn discard(&self, staging: Staging) -> Result<()>;

    /// Top `limit` payloads by similarity, optionally dropping scores below `min_score`.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Number of records in the live collection.
    async fn count(&self) -> Result<usize>;
}

/// Full-text (BM25) index over chunk text.
pub trait KeywordIndex: Send + Sync {
    /// Start a rebuild. Dropping the writer without publishing discards it.
    fn stage(&self) -> Result<Box<dyn KeywordIndexWriter>>;

    fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>>;

    fn count(&self) -> Result<usize>;
}

/// A staged keyword index. Publishing is two-phase so the slow, fallible part can
/// finish before the vector store swaps.
pub trait KeywordIndexWriter: Send {
    fn add(&mut self, chunk: &Chunk) -> Result<()>;

    /// Flush every added chunk to the staged index. Returns the number written.
    /// Searches still see the previous version.
    fn commit(&mut self) -> Result<usize>;

    /// Swap in a committed index. Errors if `commit` has not succeeded.
    fn publish(self: Box<Self>) -> Result<()>;
}

/// Build the vector store selected by `VECTOR_STORE`.
pub fn open_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    match config.vector_store.backend.as_str() {
        "qdrant" => Ok(Arc::new(qdrant::QdrantStore::new(
            &config.vector_store,
            config.retrieval.lookup_timeout_secs,
        )?)),
        "local" => Ok(Arc::new(vector::LocalVectorStore::open(
            &config.vector_dir(),
        )?)),
        other => Err(Error::Config(format!("Unknown vector store backend: {other}"))),
    }
}
