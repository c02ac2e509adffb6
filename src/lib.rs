//! # docs-chat
//!
//! A retrieval-augmented chatbot over a crawled documentation site. Pages are
//! crawled and chunked offline into a vector index and a BM25 keyword index;
//! each chat query retrieves from both, reranks, and asks a language model to
//! answer from the retrieved context only, citing the source pages.
//!
//! ## Architecture
//!
//! ```text
//!   offline                                     online (POST /chat)
//!   ───────                                     ───────────────────
//!   docs-crawl                                  ┌──────────────┐
//!     sitemap ─► fetch ─► extract               │  User Query  │
//!                  │                            └──────┬───────┘
//!                  ▼                          ┌────────┴────────┐
//!           ┌──────────────┐                  ▼                 ▼
//!           │DocumentStore │          ┌──────────────┐  ┌──────────────┐
//!           └──────┬───────┘          │Vector lookup │  │  BM25 lookup │
//!   docs-index     │                  │   (top k)    │  │   (top k)    │
//!                  ▼                  └──────┬───────┘  └──────┬───────┘
//!           ┌──────────────┐                 └────────┬────────┘
//!           │   Chunker    │                          ▼
//!           └──────┬───────┘               ┌────────────────────┐
//!                  ▼                       │ Merge + dedupe by  │
//!           ┌──────────────┐               │ chunk id (vector   │
//!           │  Embedder    │               │ hits first)        │
//!           └──────┬───────┘               └─────────┬──────────┘
//!        ┌─────────┴─────────┐                       ▼
//!        ▼                   ▼             ┌────────────────────┐
//!  ┌───────────┐      ┌───────────┐        │ Cross-encoder      │
//!  │VectorStore│      │KeywordIdx │        │ rerank, keep top N │
//!  │ (staged)  │      │ (staged)  │        └─────────┬──────────┘
//!  └───────────┘      └───────────┘                  ▼
//!        └── publish both ──┘              ┌────────────────────┐
//!                                          │ Prompt + one LLM   │
//!                                          │ call → answer,     │
//!                                          │ distinct sources   │
//!                                          └────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for all components
//! - [`error`] - Crate error type and its HTTP status mapping
//! - [`models`] - Shared data types: `Document`, `Chunk`, `Candidate`, request/response types
//! - [`documents`] - On-disk markdown document store written by the crawler
//! - [`crawl`] - Sitemap discovery, page fetch and HTML extraction
//! - [`chunking`] - Fixed-size overlapping character windows
//! - [`search::bm25`] - BM25 keyword index powered by tantivy
//! - [`search::vector`] - File-backed vector store with cosine similarity
//! - [`search::qdrant`] - Qdrant REST vector store with alias-swapped rebuilds
//! - [`search::hybrid`] - Concurrent vector + keyword retrieval and merge
//! - [`llm::embeddings`] - Batch embeddings via Ollama or OpenAI-compatible APIs
//! - [`llm::cross_encoder`] - Cross-encoder scoring via a `/v1/rerank` endpoint
//! - [`llm::generate`] - Single-shot answer generation
//! - [`rerank`] - Candidate reordering by cross-encoder score
//! - [`answer`] - Grounded prompt construction and source collection
//! - [`indexer`] - Offline rebuild of both indices
//! - [`pipeline`] - Query-time validate → retrieve → rerank → answer
//! - [`api`] - Axum router and the `/chat` handler
//! - [`state`] - Component wiring shared by the server and the binaries

pub mod answer;
pub mod api;
pub mod chunking;
pub mod config;
pub mod crawl;
pub mod documents;
pub mod error;
pub mod indexer;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod rerank;
pub mod search;
pub mod state;

pub use error::{Error, Result};
