use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::llm::error_body;

/// Single-shot text completion.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Non-streaming chat completion against Ollama or an OpenAI-compatible API.
/// One attempt per call, bounded by `LlmConfig::timeout_secs`.
pub struct ChatGenerator {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatGenerator {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs.max(1))
    }
}

#[async_trait]
impl Generator for ChatGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let content = match self.config.provider.as_str() {
            "ollama" => self.call_ollama(prompt).await?,
            "openai" => self.call_openai(prompt).await?,
            other => return Err(Error::Config(format!("Unknown LLM provider: {other}"))),
        };

        let content = content.trim();
        if content.is_empty() {
            return Err(Error::generation("Model returned an empty answer"));
        }
        Ok(content.to_string())
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatGenerator {
    async fn call_ollama(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));

        let req = OllamaChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![user_message(prompt)],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout())
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::generation(format!("Failed to call Ollama chat API: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::generation(format!(
                "Ollama chat API returned {}",
                error_body(resp).await
            )));
        }

        let body: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::generation(format!("Failed to parse Ollama response: {e}")))?;
        Ok(body.message.content)
    }

    async fn call_openai(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let req = OpenAiChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![user_message(prompt)],
            temperature: self.config.temperature,
        };

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout())
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::generation(format!("Failed to call OpenAI chat API: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::generation(format!(
                "OpenAI chat API returned {}",
                error_body(resp).await
            )));
        }

        let body: OpenAiChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::generation(format!("Failed to parse OpenAI response: {e}")))?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

fn user_message(prompt: &str) -> Message {
    Message {
        role: "user".to_string(),
        content: prompt.to_string(),
    }
}
