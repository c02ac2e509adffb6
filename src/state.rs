use std::sync::Arc;
use std::time::Duration;

use crate::answer::AnswerGenerator;
use crate::chunking::Chunker;
use crate::config::Config;
use crate::error::Result;
use crate::indexer::Indexer;
use crate::llm::cross_encoder::CrossEncoderReranker;
use crate::llm::embeddings::{Embedder, HttpEmbedder};
use crate::llm::generate::ChatGenerator;
use crate::pipeline::ChatPipeline;
use crate::rerank::Reranker;
use crate::search::bm25::Bm25Index;
use crate::search::hybrid::HybridRetriever;
use crate::search::{open_vector_store, KeywordIndex, VectorStore};

/// Retrieval components shared by the chat server and the indexing job.
/// Both must embed with the same model and read the same indices.
#[derive(Clone)]
pub struct Services {
    pub http_client: reqwest::Client,
    pub embedder: Arc<dyn Embedder>,
    pub vectors: Arc<dyn VectorStore>,
    pub keywords: Arc<dyn KeywordIndex>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        let embedder: Arc<dyn Embedder> =
            Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let vectors = open_vector_store(config)?;
        let keywords: Arc<dyn KeywordIndex> =
            Arc::new(Bm25Index::open(&config.keyword_index_dir())?);

        Ok(Self {
            http_client,
            embedder,
            vectors,
            keywords,
        })
    }

    pub fn indexer(&self, config: &Config) -> Result<Indexer> {
        Ok(Indexer::new(
            Chunker::new(config.chunking)?,
            self.embedder.clone(),
            self.vectors.clone(),
            self.keywords.clone(),
            config.indexing.batch_size,
        ))
    }

    pub fn chat_pipeline(&self, config: &Config) -> ChatPipeline {
        let retriever = HybridRetriever::new(
            self.embedder.clone(),
            self.vectors.clone(),
            self.keywords.clone(),
        )
        .with_min_vector_score(config.retrieval.min_vector_score)
        .with_lookup_timeout(Duration::from_secs(config.retrieval.lookup_timeout_secs.max(1)));

        let reranker = CrossEncoderReranker::from_config(self.http_client.clone(), &config.reranker)
            .map(|r| Arc::new(r) as Arc<dyn Reranker>);
        if reranker.is_none() {
            tracing::warn!(
                "RERANKER_BASE_URL not set, skipping cross-encoder reranking; answers use retrieval order"
            );
        }

        let answers = AnswerGenerator::new(Arc::new(ChatGenerator::new(
            self.http_client.clone(),
            config.llm.clone(),
        )));

        ChatPipeline::new(retriever, reranker, answers, &config.retrieval)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<ChatPipeline>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let services = Services::from_config(&config)?;
        let pipeline = services.chat_pipeline(&config);
        Ok(Self::with_pipeline(config, pipeline))
    }

    pub fn with_pipeline(config: Config, pipeline: ChatPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}
