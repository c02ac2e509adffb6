//! Offline index build: chunk every document, embed in batches, and publish fresh
//! vector and keyword indices.
//!
//! ```text
//! documents ──► Chunker ──► batches ──► Embedder ──► VectorStore (staged)
//!                               │
//!                               └──────────────────► KeywordIndex (staged)
//!
//!        all batches done ──► commit keywords ──► publish vectors ──► publish keywords
//! ```
//!
//! A chunk that cannot be embedded is skipped in both indices, so the two always cover
//! the same chunks. A vector store failure or a failed keyword commit aborts the run
//! with nothing published.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::chunking::Chunker;
use crate::error::{Error, Result};
use crate::llm::embeddings::Embedder;
use crate::models::{Chunk, ChunkPayload, Document, EmbeddingRecord};
use crate::search::{KeywordIndex, KeywordIndexWriter, Staging, VectorStore};

/// Summary of one rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub documents: usize,
    pub chunks: usize,
    pub indexed: usize,
    pub skipped: usize,
}

/// Exclusive marker held for the duration of an indexing run. Removed on drop.
#[derive(Debug)]
pub struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::IndexLocked(describe_holder(path)));
            }
            Err(e) => return Err(e.into()),
        };
        // Read back by `describe_holder` when another run finds the lock.
        let _ = writeln!(file, "{}", std::process::id());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

/// Lock path plus the PID recorded by the holder, so a stale lock can be spotted.
fn describe_holder(path: &Path) -> String {
    let pid = std::fs::read_to_string(path)
        .ok()
        .map(|text| text.trim().to_string())
        .filter(|pid| !pid.is_empty());
    match pid {
        Some(pid) => format!(
            "{} (held by pid {pid}; delete it if that process is no longer running)",
            path.display()
        ),
        None => format!("{} (holder pid unknown)", path.display()),
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove lock file {}: {e}", self.path.display());
        }
    }
}

pub struct Indexer {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    keywords: Arc<dyn KeywordIndex>,
    batch_size: usize,
}

impl Indexer {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        keywords: Arc<dyn KeywordIndex>,
        batch_size: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            vectors,
            keywords,
            batch_size: batch_size.max(1),
        }
    }

    /// Rebuild both indices from `documents`. On error the previously published
    /// indices stay live.
    pub async fn rebuild(&self, documents: &[Document]) -> Result<IndexReport> {
        if documents.is_empty() {
            return Err(Error::Documents(
                "No documents found. Run the crawler first.".to_string(),
            ));
        }
        let started = Instant::now();

        let dimensions = self.embedder.embed("dimension check").await?.len();
        if dimensions == 0 {
            return Err(Error::embedding("Embedder returned an empty vector"));
        }
        tracing::info!(
            "Indexing {} documents into {} store ({dimensions} dims)",
            documents.len(),
            self.vectors.name()
        );

        let staging = self.vectors.prepare(dimensions).await?;
        let (report, keyword_writer) = match self.build(documents, dimensions, &staging).await {
            Ok(built) => built,
            Err(e) => {
                self.discard(staging).await;
                return Err(e);
            }
        };

        if report.indexed == 0 {
            self.discard(staging).await;
            return Err(Error::embedding(format!(
                "None of {} chunks could be embedded",
                report.chunks
            )));
        }

        // Commit the keyword side first: after the vector swap only renames remain.
        let committed = tokio::task::spawn_blocking(
            move || -> Result<(Box<dyn KeywordIndexWriter>, usize)> {
                let mut writer = keyword_writer;
                let count = writer.commit()?;
                Ok((writer, count))
            },
        )
        .await
        .map_err(|e| Error::KeywordIndex(format!("Keyword commit task failed: {e}")))
        .and_then(|committed| committed);
        let (keyword_writer, keyword_count) = match committed {
            Ok(committed) => committed,
            Err(e) => {
                self.discard(staging).await;
                return Err(e);
            }
        };

        // Dropping the keyword writer on a vector publish error discards it.
        self.vectors.publish(staging).await?;
        tokio::task::spawn_blocking(move || keyword_writer.publish())
            .await
            .map_err(|e| Error::KeywordIndex(format!("Keyword publish task failed: {e}")))??;

        if keyword_count != report.indexed {
            tracing::warn!(
                "Keyword index holds {keyword_count} chunks, vector store {}",
                report.indexed
            );
        }
        tracing::info!(
            documents = report.documents,
            chunks = report.chunks,
            indexed = report.indexed,
            skipped = report.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Index rebuild complete"
        );
        Ok(report)
    }

    async fn build(
        &self,
        documents: &[Document],
        dimensions: usize,
        staging: &Staging,
    ) -> Result<(IndexReport, Box<dyn KeywordIndexWriter>)> {
        let mut writer = self.keywords.stage()?;
        let mut report = IndexReport {
            documents: documents.len(),
            ..IndexReport::default()
        };
        let mut batch: Vec<Chunk> = Vec::with_capacity(self.batch_size);

        for doc in documents {
            for chunk in self.chunker.chunks(doc) {
                report.chunks += 1;
                if chunk.text.trim().is_empty() {
                    report.skipped += 1;
                    continue;
                }
                batch.push(chunk);
                if batch.len() >= self.batch_size {
                    let full = std::mem::take(&mut batch);
                    self.index_batch(full, dimensions, staging, writer.as_mut(), &mut report)
                        .await?;
                }
            }
        }
        if !batch.is_empty() {
            self.index_batch(batch, dimensions, staging, writer.as_mut(), &mut report)
                .await?;
        }

        Ok((report, writer))
    }

    async fn index_batch(
        &self,
        batch: Vec<Chunk>,
        dimensions: usize,
        staging: &Staging,
        writer: &mut dyn KeywordIndexWriter,
        report: &mut IndexReport,
    ) -> Result<()> {
        let vectors = self.embed_isolating_failures(&batch).await;

        let mut records = Vec::with_capacity(batch.len());
        let mut kept = Vec::with_capacity(batch.len());
        for (chunk, vector) in batch.iter().zip(vectors) {
            match vector {
                Some(vector) if vector.len() == dimensions => {
                    records.push(EmbeddingRecord {
                        chunk_id: chunk.id.clone(),
                        vector,
                        payload: ChunkPayload::from(chunk),
                    });
                    kept.push(chunk);
                }
                Some(vector) => {
                    tracing::warn!(
                        "Skipping {}: embedding has {} dims, expected {dimensions}",
                        chunk.id,
                        vector.len()
                    );
                    report.skipped += 1;
                }
                None => report.skipped += 1,
            }
        }

        if records.is_empty() {
            return Ok(());
        }
        self.vectors.upsert(staging, &records).await?;
        for chunk in kept {
            writer.add(chunk)?;
        }
        report.indexed += records.len();
        tracing::debug!("Indexed {} chunks so far", report.indexed);
        Ok(())
    }

    /// Embed a batch; if the batch call fails, embed chunk by chunk so one bad chunk
    /// only costs itself.
    async fn embed_isolating_failures(&self, batch: &[Chunk]) -> Vec<Option<Vec<f32>>> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        match self.embedder.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == texts.len() => {
                return vectors.into_iter().map(Some).collect();
            }
            Ok(vectors) => tracing::warn!(
                "Batch embedding returned {} vectors for {} chunks, retrying individually",
                vectors.len(),
                texts.len()
            ),
            Err(e) => tracing::warn!("Batch embedding failed, retrying individually: {e}"),
        }

        let mut out = Vec::with_capacity(batch.len());
        for chunk in batch {
            match self.embedder.embed(&chunk.text).await {
                Ok(vector) => out.push(Some(vector)),
                Err(e) => {
                    tracing::warn!("Skipping {}: {e}", chunk.id);
                    out.push(None);
                }
            }
        }
        out
    }

    async fn discard(&self, staging: Staging) {
        if let Err(e) = self.vectors.discard(staging).await {
            tracing::warn!("Failed to discard staged vector collection: {e}");
        }
    }
}
