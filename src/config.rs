use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where crawled documents and index artifacts are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Origins allowed to call the chat endpoint cross-origin. Empty disables CORS.
    pub allowed_origins: Vec<String>,
    /// Embedding and generation provider configuration
    pub llm: LlmConfig,
    /// Cross-encoder reranker configuration. Off by default: the stock deployment
    /// answers from hybrid retrieval order until `RERANKER_BASE_URL` is set.
    pub reranker: RerankerConfig,
    /// Vector database configuration
    pub vector_store: VectorStoreConfig,
    /// Documentation crawl settings
    pub crawl: CrawlConfig,
    /// Chunk window settings
    pub chunking: ChunkingConfig,
    /// Indexing job settings
    pub indexing: IndexingConfig,
    /// Query-time retrieval settings
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answer generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Upper bound for a single generation call
    pub timeout_secs: u64,
    pub temperature: f32,
}

/// Configuration for the cross-encoder reranker sidecar (e.g. llama-server with a
/// ms-marco or Qwen3 reranker model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL for the reranker API (e.g. "http://127.0.0.1:8082").
    ///
    /// Defaults to None, which skips the cross-encoder stage entirely: candidates keep
    /// their fused retrieval order and a warning is logged when the chat pipeline is
    /// built. Set `RERANKER_BASE_URL` to a server exposing `/v1/rerank` to enable it.
    pub base_url: Option<String>,
    /// Model name to send in the rerank request.
    pub model: Option<String>,
    /// Request timeout in seconds (capped at 30).
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// "qdrant" or "local"
    pub backend: String,
    pub url: String,
    pub api_key: Option<String>,
    /// Collection name readers query. For Qdrant this is an alias over versioned collections.
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Seed URL; only pages on the same host are crawled
    pub domain: String,
    pub max_pages: usize,
    /// Maximum page fetches in flight
    pub concurrency: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window length in characters
    pub size: usize,
    /// Characters shared between consecutive windows
    pub overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Chunks per embedding request
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// K used when a chat request does not specify one
    pub default_k: usize,
    pub max_k: usize,
    /// Candidates kept after reranking
    pub top_n: usize,
    /// Vector hits scoring below this are dropped by the store
    pub min_vector_score: f32,
    /// Per sub-lookup timeout; a timed out lookup counts as empty
    pub lookup_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            allowed_origins: Vec::new(),
            llm: LlmConfig::default(),
            reranker: RerankerConfig::default(),
            vector_store: VectorStoreConfig::default(),
            crawl: CrawlConfig::default(),
            chunking: ChunkingConfig::default(),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_key: None,
            timeout_secs: 60,
            temperature: 0.2,
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            timeout_secs: 10,
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: "qdrant".to_string(),
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "capillary_docs".to_string(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            domain: "https://docs.capillarytech.com/".to_string(),
            max_pages: 500,
            concurrency: 5,
            timeout_secs: 30,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: 1200,
            overlap: 180,
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self { batch_size: 64 }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 8,
            max_k: 50,
            top_n: 6,
            min_vector_score: 0.15,
            lookup_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. `from_env` is this over the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("DOCS_CHAT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup("DOCS_CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(origins) = lookup("DOCS_CHAT_ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        // LLM config
        if let Some(provider) = lookup("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Some(model) = lookup("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Some(key) = lookup("LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            config.llm.api_key = Some(key);
        }
        parse_into(&lookup, "LLM_TIMEOUT_SECS", &mut config.llm.timeout_secs);
        parse_into(&lookup, "LLM_TEMPERATURE", &mut config.llm.temperature);

        // Reranker config
        if let Some(url) = lookup("RERANKER_BASE_URL") {
            config.reranker.base_url = Some(url);
        }
        if let Some(model) = lookup("RERANKER_MODEL") {
            config.reranker.model = Some(model);
        }
        if let Some(val) = lookup("RERANKER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.reranker.timeout_secs = v.min(30); // Cap at 30s
            }
        }

        // Vector store config
        if let Some(backend) = lookup("VECTOR_STORE") {
            config.vector_store.backend = backend;
        }
        if let Some(url) = lookup("QDRANT_URL") {
            config.vector_store.url = url;
        }
        if let Some(key) = lookup("QDRANT_API_KEY") {
            config.vector_store.api_key = Some(key);
        }
        if let Some(collection) = lookup("QDRANT_COLLECTION") {
            config.vector_store.collection = collection;
        }

        // Crawl config
        if let Some(domain) = lookup("DOCS_DOMAIN") {
            config.crawl.domain = domain;
        }
        parse_into(&lookup, "CRAWL_MAX_PAGES", &mut config.crawl.max_pages);
        parse_into(&lookup, "CRAWL_CONCURRENCY", &mut config.crawl.concurrency);
        parse_into(&lookup, "CRAWL_TIMEOUT_SECS", &mut config.crawl.timeout_secs);

        // Chunking and indexing
        parse_into(&lookup, "CHUNK_SIZE", &mut config.chunking.size);
        parse_into(&lookup, "CHUNK_OVERLAP", &mut config.chunking.overlap);
        parse_into(&lookup, "EMBED_BATCH_SIZE", &mut config.indexing.batch_size);

        // Retrieval
        parse_into(&lookup, "RETRIEVAL_DEFAULT_K", &mut config.retrieval.default_k);
        parse_into(&lookup, "RETRIEVAL_MAX_K", &mut config.retrieval.max_k);
        parse_into(&lookup, "RERANK_TOP_N", &mut config.retrieval.top_n);
        parse_into(
            &lookup,
            "VECTOR_SCORE_THRESHOLD",
            &mut config.retrieval.min_vector_score,
        );
        parse_into(
            &lookup,
            "LOOKUP_TIMEOUT_SECS",
            &mut config.retrieval.lookup_timeout_secs,
        );

        config
    }

    /// Reject settings no component could run with.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.llm.provider.as_str(), "openai" | "ollama") {
            return Err(Error::Config(format!(
                "Unknown LLM provider: {}",
                self.llm.provider
            )));
        }
        if !matches!(self.vector_store.backend.as_str(), "qdrant" | "local") {
            return Err(Error::Config(format!(
                "Unknown vector store backend: {}",
                self.vector_store.backend
            )));
        }
        if self.vector_store.collection.trim().is_empty() {
            return Err(Error::Config("Collection name is required".to_string()));
        }
        if self.chunking.size == 0 || self.chunking.overlap >= self.chunking.size {
            return Err(Error::Config(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.overlap, self.chunking.size
            )));
        }
        if self.retrieval.default_k == 0 || self.retrieval.default_k > self.retrieval.max_k {
            return Err(Error::Config(format!(
                "Default k ({}) must be between 1 and {}",
                self.retrieval.default_k, self.retrieval.max_k
            )));
        }
        if self.retrieval.top_n == 0 {
            return Err(Error::Config("Rerank top-n must be at least 1".to_string()));
        }
        if self.crawl.concurrency == 0 || self.indexing.batch_size == 0 {
            return Err(Error::Config(
                "Crawl concurrency and embedding batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Crawled markdown documents
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn keyword_index_dir(&self) -> PathBuf {
        self.data_dir.join("index").join("bm25")
    }

    /// Only used by the local vector store backend
    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("index").join("vectors")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("index").join(".indexing.lock")
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(val) = lookup(key) {
        if let Ok(v) = val.trim().parse() {
            *target = v;
        }
    }
}
