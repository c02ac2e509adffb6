//! Documentation crawler: sitemap discovery, bounded-concurrency page fetch, and
//! HTML extraction into the document store.

pub mod page;
pub mod sitemap;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::config::CrawlConfig;
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::models::Document;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub discovered: usize,
    pub saved: usize,
    pub skipped: usize,
}

pub struct Crawler {
    client: reqwest::Client,
    config: CrawlConfig,
}

impl Crawler {
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("docs-chat/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// Crawl the configured domain and persist every page that yields text.
    /// Individual page failures, fetch or save, are logged and skipped.
    pub async fn run(&self, store: &DocumentStore) -> Result<CrawlReport> {
        let seed = Url::parse(&self.config.domain)
            .map_err(|e| Error::Crawl(format!("Invalid crawl domain {}: {e}", self.config.domain)))?;

        let urls = sitemap::discover(&self.client, &seed, self.config.max_pages).await;
        let mut report = CrawlReport {
            discovered: urls.len(),
            ..CrawlReport::default()
        };
        tracing::info!(
            "Fetching {} pages (concurrency {})",
            urls.len(),
            self.config.concurrency
        );

        let mut pages = stream::iter(urls)
            .map(|url| async move {
                let result = self.fetch(&url).await;
                (url, result)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((url, result)) = pages.next().await {
            match result {
                Ok(Some(doc)) => match store.save(&doc) {
                    Ok(path) => {
                        report.saved += 1;
                        tracing::debug!("Saved {url} to {}", path.display());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to save {url}: {e}");
                        report.skipped += 1;
                    }
                },
                Ok(None) => {
                    tracing::warn!("No text extracted from {url}, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch {url}: {e}");
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Fetch and extract one page. `None` when the page has no text.
    pub async fn fetch(&self, url: &str) -> Result<Option<Document>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Crawl(format!("Request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Crawl(format!("HTTP {}", resp.status())));
        }
        let html = resp
            .text()
            .await
            .map_err(|e| Error::Crawl(format!("Failed to read body: {e}")))?;

        let extracted = page::extract(&html);
        if extracted.text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(Document {
            url: url.to_string(),
            title: extracted.title,
            raw_text: extracted.text,
            fetched_at: Utc::now(),
        }))
    }
}
