//! Qdrant REST vector store.
//!
//! Readers query `collection`, which is an alias. Every rebuild writes a fresh
//! `{collection}__{version}` collection and then repoints the alias in one
//! `POST /collections/aliases` call, so a query sees either the old or the new
//! collection in full. The superseded collection is dropped after the swap.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::error::{Error, Result};
use crate::llm::{error_body, send_with_retry};
use crate::models::{point_id, ChunkPayload, EmbeddingRecord};
use crate::search::versioned::new_version_name;
use crate::search::{ScoredChunk, Staging, VectorStore};

pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig, timeout_secs: u64) -> Result<Self> {
        if !(config.url.starts_with("http://") || config.url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Qdrant URL must be an http(s) URL, got {}",
                config.url
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let value = HeaderValue::from_str(key.trim())
                .map_err(|_| Error::Config("Invalid Qdrant API key".to_string()))?;
            headers.insert("api-key", value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and unwrap Qdrant's `{"result": ...}` envelope.
    /// Returns `None` when the collection or alias does not exist.
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<Option<T>> {
        let resp = send_with_retry(request)
            .await
            .map_err(|e| Error::vector_store(format!("Failed to reach Qdrant ({what}): {e}")))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::vector_store(format!(
                "Qdrant {what} returned {}",
                error_body(resp).await
            )));
        }

        let body: QdrantResponse<T> = resp
            .json()
            .await
            .map_err(|e| Error::vector_store(format!("Failed to parse Qdrant {what} response: {e}")))?;
        Ok(Some(body.result))
    }

    async fn call_required<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        self.call(request, what)
            .await?
            .ok_or_else(|| Error::vector_store(format!("Qdrant {what}: not found")))
    }

    /// Collection the alias currently points at.
    async fn alias_target(&self) -> Result<Option<String>> {
        let aliases: AliasList = self
            .call_required(self.client.get(self.url("/aliases")), "list aliases")
            .await?;
        Ok(aliases
            .aliases
            .into_iter()
            .find(|a| a.alias_name == self.collection)
            .map(|a| a.collection_name))
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections: CollectionList = self
            .call_required(self.client.get(self.url("/collections")), "list collections")
            .await?;
        Ok(collections.collections.iter().any(|c| c.name == name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let _: Option<serde_json::Value> = self
            .call(
                self.client.delete(self.url(&format!("/collections/{name}"))),
                "delete collection",
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn prepare(&self, dimensions: usize) -> Result<Staging> {
        let name = format!("{}__{}", self.collection, new_version_name());
        let body = json!({ "vectors": { "size": dimensions, "distance": "Cosine" } });
        let _: serde_json::Value = self
            .call_required(
                self.client
                    .put(self.url(&format!("/collections/{name}")))
                    .json(&body),
                "create collection",
            )
            .await?;
        tracing::info!("Created Qdrant collection {name} ({dimensions} dims)");
        Ok(Staging(name))
    }

    async fn upsert(&self, staging: &Staging, records: &[EmbeddingRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let points: Vec<Point> = records
            .iter()
            .map(|r| Point {
                id: point_id(&r.chunk_id).to_string(),
                vector: &r.vector,
                payload: &r.payload,
            })
            .collect();

        let _: serde_json::Value = self
            .call_required(
                self.client
                    .put(self.url(&format!("/collections/{}/points?wait=true", staging.0)))
                    .json(&json!({ "points": points })),
                "upsert points",
            )
            .await?;
        Ok(())
    }

    async fn publish(&self, staging: Staging) -> Result<()> {
        let previous = self.alias_target().await?;

        // A plain collection squatting on the alias name blocks alias creation.
        if previous.is_none() && self.collection_exists(&self.collection).await? {
            tracing::warn!(
                "Replacing legacy collection {} with an alias",
                self.collection
            );
            self.delete_collection(&self.collection).await?;
        }

        let mut actions = Vec::new();
        if previous.is_some() {
            actions.push(json!({ "delete_alias": { "alias_name": self.collection } }));
        }
        actions.push(json!({
            "create_alias": { "collection_name": staging.0, "alias_name": self.collection }
        }));

        let _: serde_json::Value = self
            .call_required(
                self.client
                    .post(self.url("/collections/aliases"))
                    .json(&json!({ "actions": actions })),
                "update aliases",
            )
            .await?;
        tracing::info!("Alias {} now points at {}", self.collection, staging.0);

        if let Some(old) = previous.filter(|old| *old != staging.0) {
            if let Err(e) = self.delete_collection(&old).await {
                tracing::warn!("Failed to drop superseded collection {old}: {e}");
            }
        }
        Ok(())
    }

    async fn discard(&self, staging: Staging) -> Result<()> {
        self.delete_collection(&staging.0).await?;
        tracing::info!("Dropped unpublished collection {}", staging.0);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = min_score {
            body["score_threshold"] = json!(threshold);
        }

        let hits: Option<Vec<SearchHit>> = self
            .call(
                self.client
                    .post(self.url(&format!("/collections/{}/points/search", self.collection)))
                    .json(&body),
                "search",
            )
            .await?;
        let Some(hits) = hits else {
            tracing::warn!("Qdrant collection {} does not exist yet", self.collection);
            return Ok(Vec::new());
        };

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let payload = hit.payload?;
                match serde_json::from_value::<ChunkPayload>(payload) {
                    Ok(payload) => Some(ScoredChunk {
                        payload,
                        score: hit.score,
                    }),
                    Err(e) => {
                        tracing::warn!("Skipping point with malformed payload: {e}");
                        None
                    }
                }
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let count: Option<CountResult> = self
            .call(
                self.client
                    .post(self.url(&format!("/collections/{}/points/count", self.collection)))
                    .json(&json!({ "exact": true })),
                "count",
            )
            .await?;
        Ok(count.map(|c| c.count).unwrap_or(0))
    }
}

// ─── Request/Response types ────────────────────────────

#[derive(Serialize)]
struct Point<'a> {
    id: String,
    vector: &'a [f32],
    payload: &'a ChunkPayload,
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct AliasList {
    aliases: Vec<AliasDescription>,
}

#[derive(Deserialize)]
struct AliasDescription {
    alias_name: String,
    collection_name: String,
}

#[derive(Deserialize)]
struct CollectionList {
    collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Deserialize)]
struct SearchHit {
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> VectorStoreConfig {
        VectorStoreConfig {
            url: url.to_string(),
            ..VectorStoreConfig::default()
        }
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(QdrantStore::new(&config("localhost:6333"), 5).is_err());
        assert!(QdrantStore::new(&config("http://localhost:6333/"), 5).is_ok());
    }

    #[test]
    fn test_search_hit_payload_parses() {
        let raw = r#"{"result":[{"id":"a","version":1,"score":0.82,"payload":{
            "chunk_id":"https://docs.example.com/tiers#0",
            "text":"Tiers","source_url":"https://docs.example.com/tiers"}}]}"#;
        let body: QdrantResponse<Vec<SearchHit>> = serde_json::from_str(raw).unwrap();
        let payload: ChunkPayload =
            serde_json::from_value(body.result[0].payload.clone().unwrap()).unwrap();
        assert_eq!(payload.chunk_id, "https://docs.example.com/tiers#0");
        assert_eq!(payload.title, "");
    }
}
