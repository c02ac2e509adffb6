use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{ChunkPayload, EmbeddingRecord};
use crate::search::versioned::{Version, VersionedDir};
use crate::search::{ScoredChunk, Staging, VectorStore};

const COLLECTION_FILE: &str = "vectors.json";

/// A stored vector entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    payload: ChunkPayload,
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    dimensions: usize,
    entries: Vec<VectorEntry>,
}

struct LiveCollection {
    version: String,
    collection: Collection,
}

/// A rebuild in progress. Entries are keyed by chunk id so upserts replace.
struct StagedCollection {
    version: Version,
    collection: Collection,
    positions: HashMap<String, usize>,
}

/// In-memory vector store with disk persistence and cosine similarity search.
///
/// Each published collection is a JSON file in its own version directory; the store
/// reloads when the version pointer moves, so the chat server picks up a rebuild
/// made by the indexing job.
pub struct LocalVectorStore {
    versions: VersionedDir,
    live: RwLock<Option<Arc<LiveCollection>>>,
    staged: Mutex<HashMap<String, StagedCollection>>,
}

impl LocalVectorStore {
    pub fn open(vector_dir: &Path) -> Result<Self> {
        Ok(Self {
            versions: VersionedDir::open(vector_dir)?,
            live: RwLock::new(None),
            staged: Mutex::new(HashMap::new()),
        })
    }

    fn live(&self) -> Result<Option<Arc<LiveCollection>>> {
        let Some(current) = self.versions.current()? else {
            return Ok(None);
        };

        if let Some(live) = self.live.read().as_ref() {
            if live.version == current.name {
                return Ok(Some(live.clone()));
            }
        }

        let data = std::fs::read_to_string(current.path.join(COLLECTION_FILE))?;
        let collection: Collection = serde_json::from_str(&data)?;
        tracing::info!(
            "Loaded vector collection {} ({} entries)",
            current.name,
            collection.entries.len()
        );

        let loaded = Arc::new(LiveCollection {
            version: current.name,
            collection,
        });
        *self.live.write() = Some(loaded.clone());
        Ok(Some(loaded))
    }

    fn take_staged(&self, staging: &Staging) -> Result<StagedCollection> {
        self.staged
            .lock()
            .remove(&staging.0)
            .ok_or_else(|| Error::vector_store(format!("Unknown staging collection {}", staging.0)))
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn prepare(&self, dimensions: usize) -> Result<Staging> {
        let version = self.versions.stage()?;
        let staging = Staging(version.name.clone());
        self.staged.lock().insert(
            version.name.clone(),
            StagedCollection {
                version,
                collection: Collection {
                    dimensions,
                    entries: Vec::new(),
                },
                positions: HashMap::new(),
            },
        );
        Ok(staging)
    }

    async fn upsert(&self, staging: &Staging, records: &[EmbeddingRecord]) -> Result<()> {
        let mut staged = self.staged.lock();
        let build = staged
            .get_mut(&staging.0)
            .ok_or_else(|| Error::vector_store(format!("Unknown staging collection {}", staging.0)))?;

        for record in records {
            if record.vector.len() != build.collection.dimensions {
                return Err(Error::vector_store(format!(
                    "Vector for {} has {} dimensions, collection expects {}",
                    record.chunk_id,
                    record.vector.len(),
                    build.collection.dimensions
                )));
            }
            let entry = VectorEntry {
                payload: record.payload.clone(),
                embedding: record.vector.clone(),
            };
            match build.positions.get(&record.chunk_id) {
                Some(&i) => build.collection.entries[i] = entry,
                None => {
                    build
                        .positions
                        .insert(record.chunk_id.clone(), build.collection.entries.len());
                    build.collection.entries.push(entry);
                }
            }
        }
        Ok(())
    }

    async fn publish(&self, staging: Staging) -> Result<()> {
        let build = self.take_staged(&staging)?;

        let written = serde_json::to_string(&build.collection)
            .map_err(Error::from)
            .and_then(|data| {
                std::fs::write(build.version.path.join(COLLECTION_FILE), data)?;
                self.versions.publish(&build.version)
            });

        match written {
            Ok(version) => {
                tracing::info!(
                    "Published vector collection {} ({} entries)",
                    version.name,
                    build.collection.entries.len()
                );
                Ok(())
            }
            Err(e) => {
                self.versions.discard(&build.version);
                Err(e)
            }
        }
    }

    async fn discard(&self, staging: Staging) -> Result<()> {
        let build = self.take_staged(&staging)?;
        self.versions.discard(&build.version);
        Ok(())
    }

    /// Search by cosine similarity against a query embedding.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(live) = self.live()? else {
            return Ok(Vec::new());
        };
        let collection = &live.collection;
        if collection.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query_embedding.len() != collection.dimensions {
            return Err(Error::vector_store(format!(
                "Query vector has {} dimensions, collection expects {}",
                query_embedding.len(),
                collection.dimensions
            )));
        }

        let mut scored: Vec<(f32, &VectorEntry)> = collection
            .entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .filter(|(score, _)| min_score.map_or(true, |min| *score >= min))
            .collect();

        // Sort descending by score
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, e)| ScoredChunk {
                payload: e.payload.clone(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self
            .live()?
            .map(|live| live.collection.entries.len())
            .unwrap_or(0))
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
