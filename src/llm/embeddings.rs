use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::llm::{error_body, send_with_retry};

/// Maximum characters to send per text to the embedding API.
/// Documentation prose tokenises at roughly 4 chars per token, so this keeps every
/// input well inside the 8 192-token context of the common embedding models.
const MAX_EMBED_CHARS: usize = 3_000;

/// Dense text embeddings. The same implementation must be used at index and query time.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. The result is parallel with `texts`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("No embedding returned"))
    }
}

/// Cut `text` to at most `MAX_EMBED_CHARS` bytes on a char boundary.
fn clip(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let end = (0..=MAX_EMBED_CHARS)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    &text[..end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Ollama,
    OpenAi,
}

impl Provider {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("Unknown LLM provider: {other}"))),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAi => "OpenAI",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::Ollama => "/api/embed",
            Self::OpenAi => "/v1/embeddings",
        }
    }

    /// Inputs per request.
    fn batch_size(self) -> usize {
        match self {
            Self::Ollama => 32,
            Self::OpenAi => 64,
        }
    }
}

/// Embeddings from Ollama or an OpenAI-compatible API.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }

    async fn request(&self, provider: Provider, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            provider.path()
        );
        let model = self.config.embedding_model.clone();

        let request = match provider {
            // `truncate` makes Ollama clip over-long inputs instead of failing with 400.
            Provider::Ollama => self.client.post(&url).json(&OllamaEmbedRequest {
                model,
                input: inputs,
                truncate: true,
            }),
            Provider::OpenAi => self
                .client
                .post(&url)
                .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
                .json(&OpenAiEmbedRequest {
                    model,
                    input: inputs,
                }),
        };

        let label = provider.label();
        let resp = send_with_retry(request)
            .await
            .map_err(|e| Error::embedding(format!("Failed to call {label} embed API: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::embedding(format!(
                "{label} embed API returned {}",
                error_body(resp).await
            )));
        }

        let parse_error =
            |e: reqwest::Error| Error::embedding(format!("Failed to parse {label} embed response: {e}"));
        match provider {
            Provider::Ollama => {
                let body: OllamaEmbedResponse = resp.json().await.map_err(parse_error)?;
                Ok(body.embeddings)
            }
            Provider::OpenAi => {
                let body: OpenAiEmbedResponse = resp.json().await.map_err(parse_error)?;
                // `index` is documented; keep input order even if the server reorders.
                let mut data = body.data;
                data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
                Ok(data.into_iter().map(|d| d.embedding).collect())
            }
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let provider = Provider::parse(&self.config.provider)?;

        let mut embeddings = Vec::with_capacity(texts.len());
        for group in texts.chunks(provider.batch_size()) {
            let inputs = group.iter().map(|t| clip(t).to_string()).collect();
            embeddings.extend(self.request(provider, inputs).await?);
        }

        if embeddings.len() != texts.len() {
            return Err(Error::embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

// ─── Wire types ──────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_leaves_short_text() {
        assert_eq!(clip("tiers"), "tiers");
    }

    #[test]
    fn test_clip_respects_char_boundary() {
        let text = "é".repeat(MAX_EMBED_CHARS);
        let out = clip(&text);
        assert!(out.len() <= MAX_EMBED_CHARS);
        assert!(text.is_char_boundary(out.len()));
        assert!(!out.is_empty());
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        assert!(matches!(Provider::parse("bedrock"), Err(Error::Config(_))));
        assert_eq!(Provider::parse("openai").unwrap(), Provider::OpenAi);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..LlmConfig::default()
        };
        let embedder = HttpEmbedder::new(reqwest::Client::new(), config);
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }
}
