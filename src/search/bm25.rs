use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::*;
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Term};

use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkPayload};
use crate::search::versioned::{Version, VersionedDir};
use crate::search::{KeywordIndex, KeywordIndexWriter, ScoredChunk};

/// Field handles shared by the writer and the reader.
#[derive(Debug, Clone, Copy)]
struct Fields {
    chunk_id: Field,
    source_url: Field,
    title: Field,
    text: Field,
    position: Field,
}

impl Fields {
    fn schema() -> (Schema, Fields) {
        let mut schema_builder = Schema::builder();
        let chunk_id = schema_builder.add_text_field("chunk_id", STRING | STORED);
        let source_url = schema_builder.add_text_field("source_url", STRING | STORED);
        let title = schema_builder.add_text_field("title", TEXT | STORED);
        let text = schema_builder.add_text_field("text", TEXT | STORED);
        let position =
            schema_builder.add_u64_field("position", NumericOptions::default() | STORED);

        let fields = Fields {
            chunk_id,
            source_url,
            title,
            text,
            position,
        };
        (schema_builder.build(), fields)
    }

    fn of(schema: &Schema) -> Result<Fields> {
        Ok(Fields {
            chunk_id: schema.get_field("chunk_id")?,
            source_url: schema.get_field("source_url")?,
            title: schema.get_field("title")?,
            text: schema.get_field("text")?,
            position: schema.get_field("position")?,
        })
    }
}

/// An opened published version.
struct LiveIndex {
    version: String,
    index: Index,
    reader: IndexReader,
    fields: Fields,
}

/// BM25 search index built on tantivy.
///
/// Each rebuild writes a fresh index into a staging directory and publishes it by
/// swapping the version pointer. Searches reopen the index when the pointer moves.
pub struct Bm25Index {
    versions: VersionedDir,
    live: RwLock<Option<Arc<LiveIndex>>>,
}

impl Bm25Index {
    pub fn open(index_dir: &Path) -> Result<Self> {
        Ok(Self {
            versions: VersionedDir::open(index_dir)?,
            live: RwLock::new(None),
        })
    }

    /// The published index, reopened if a newer version has been swapped in.
    fn live(&self) -> Result<Option<Arc<LiveIndex>>> {
        let Some(current) = self.versions.current()? else {
            return Ok(None);
        };

        if let Some(live) = self.live.read().as_ref() {
            if live.version == current.name {
                return Ok(Some(live.clone()));
            }
        }

        let index = Index::open_in_dir(&current.path)?;
        let fields = Fields::of(&index.schema())?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let opened = Arc::new(LiveIndex {
            version: current.name.clone(),
            index,
            reader,
            fields,
        });
        tracing::info!("Opened keyword index version {}", current.name);

        *self.live.write() = Some(opened.clone());
        Ok(Some(opened))
    }
}

impl LiveIndex {
    /// Analyze the query with the text field's tokenizer and OR the distinct terms
    /// together. Operators and punctuation are never interpreted.
    fn query_for(&self, query_str: &str) -> Result<Option<BooleanQuery>> {
        let mut analyzer = self.index.tokenizer_for_field(self.fields.text)?;
        let mut stream = analyzer.token_stream(query_str);

        let mut seen = HashSet::new();
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        while stream.advance() {
            let token = stream.token().text.clone();
            if !seen.insert(token.clone()) {
                continue;
            }
            let term = Term::from_field_text(self.fields.text, &token);
            clauses.push((
                Occur::Should,
                Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)),
            ));
        }

        if clauses.is_empty() {
            return Ok(None);
        }
        Ok(Some(BooleanQuery::new(clauses)))
    }

    fn payload_of(&self, doc: &TantivyDocument) -> ChunkPayload {
        let text_of = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        ChunkPayload {
            chunk_id: text_of(self.fields.chunk_id),
            text: text_of(self.fields.text),
            source_url: text_of(self.fields.source_url),
            title: text_of(self.fields.title),
            position: doc
                .get_first(self.fields.position)
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
        }
    }
}

impl KeywordIndex for Bm25Index {
    fn stage(&self) -> Result<Box<dyn KeywordIndexWriter>> {
        let staged = self.versions.stage()?;
        let (schema, fields) = Fields::schema();

        let writer = Index::create_in_dir(&staged.path, schema)
            .and_then(|index| index.writer::<TantivyDocument>(50_000_000));
        let writer: IndexWriter = match writer {
            Ok(writer) => writer,
            Err(e) => {
                self.versions.discard(&staged);
                return Err(e.into());
            }
        };

        Ok(Box::new(Bm25Writer {
            versions: self.versions.clone(),
            staged,
            writer: Some(writer),
            fields,
            added: 0,
            committed: false,
            published: false,
        }))
    }

    /// Search the index and return scored hits.
    fn search(&self, query_str: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(live) = self.live()? else {
            tracing::debug!("Keyword index has not been built yet");
            return Ok(Vec::new());
        };
        let Some(query) = live.query_for(query_str)? else {
            return Ok(Vec::new());
        };

        let searcher = live.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let payload = live.payload_of(&doc);
            if payload.chunk_id.is_empty() {
                continue;
            }
            hits.push(ScoredChunk { payload, score });
        }

        Ok(hits)
    }

    fn count(&self) -> Result<usize> {
        Ok(self
            .live()?
            .map(|live| live.reader.searcher().num_docs() as usize)
            .unwrap_or(0))
    }
}

/// Writer for one staged rebuild. Discards the staging directory unless published.
struct Bm25Writer {
    versions: VersionedDir,
    staged: Version,
    writer: Option<IndexWriter>,
    fields: Fields,
    added: usize,
    committed: bool,
    published: bool,
}

impl KeywordIndexWriter for Bm25Writer {
    fn add(&mut self, chunk: &Chunk) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::KeywordIndex("Writer already closed".to_string()))?;

        writer.add_document(doc!(
            self.fields.chunk_id => chunk.id.clone(),
            self.fields.source_url => chunk.source_url.clone(),
            self.fields.title => chunk.title.clone(),
            self.fields.text => chunk.text.clone(),
            self.fields.position => chunk.position as u64,
        ))?;
        self.added += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<usize> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| Error::KeywordIndex("Writer already closed".to_string()))?;
        writer.commit()?;
        writer.wait_merging_threads()?;
        self.committed = true;
        tracing::debug!("Committed keyword index {} ({} chunks)", self.staged.name, self.added);
        Ok(self.added)
    }

    fn publish(mut self: Box<Self>) -> Result<()> {
        if !self.committed {
            return Err(Error::KeywordIndex(format!(
                "Keyword index {} published before commit",
                self.staged.name
            )));
        }
        let version = self.versions.publish(&self.staged)?;
        self.published = true;
        tracing::info!(
            "Published keyword index version {} ({} chunks)",
            version.name,
            self.added
        );
        Ok(())
    }
}

impl Drop for Bm25Writer {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        // Release the tantivy writer lock before removing its directory.
        drop(self.writer.take());
        self.versions.discard(&self.staged);
        tracing::warn!("Discarded unpublished keyword index {}", self.staged.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(url: &str, position: usize, text: &str) -> Chunk {
        Chunk {
            id: Chunk::make_id(url, position),
            source_url: url.to_string(),
            title: "Loyalty".to_string(),
            text: text.to_string(),
            position,
            offset: 0,
        }
    }

    fn build(index: &Bm25Index, chunks: &[Chunk]) -> usize {
        let mut writer = index.stage().unwrap();
        for c in chunks {
            writer.add(c).unwrap();
        }
        let written = writer.commit().unwrap();
        writer.publish().unwrap();
        written
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Bm25Index::open(tmp.path()).unwrap();
        assert!(index.search("tiers", 5).unwrap().is_empty());
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_search_ranks_matching_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Bm25Index::open(tmp.path()).unwrap();
        let written = build(
            &index,
            &[
                chunk("https://docs.example.com/tiers", 0, "Loyalty tiers reward members by spend"),
                chunk("https://docs.example.com/coupons", 0, "Coupons are issued per campaign"),
            ],
        );
        assert_eq!(written, 2);

        let hits = index.search("How do tiers work?", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.chunk_id, "https://docs.example.com/tiers#0");
        assert_eq!(hits[0].payload.title, "Loyalty");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_operator_characters_are_plain_text() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Bm25Index::open(tmp.path()).unwrap();
        build(&index, &[chunk("https://docs.example.com/a", 0, "points expiry rules")]);

        // Would be a syntax error for a query parser
        let hits = index.search("points AND (expiry OR \"", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(index.search("!!! ??", 5).unwrap().is_empty());
    }

    #[test]
    fn test_limit_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Bm25Index::open(tmp.path()).unwrap();
        build(&index, &[chunk("https://docs.example.com/a", 0, "tiers")]);
        assert!(index.search("tiers", 0).unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_replaces_previous_index() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Bm25Index::open(tmp.path()).unwrap();
        build(&index, &[chunk("https://docs.example.com/old", 0, "legacy tiers page")]);
        assert_eq!(index.count().unwrap(), 1);

        build(
            &index,
            &[
                chunk("https://docs.example.com/new", 0, "tiers overview"),
                chunk("https://docs.example.com/new", 1, "tiers upgrade rules"),
            ],
        );
        assert_eq!(index.count().unwrap(), 2);
        let hits = index.search("tiers", 10).unwrap();
        assert!(hits.iter().all(|h| h.payload.source_url.ends_with("/new")));
    }

    #[test]
    fn test_dropped_writer_leaves_live_index() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Bm25Index::open(tmp.path()).unwrap();
        build(&index, &[chunk("https://docs.example.com/a", 0, "tiers")]);

        {
            let mut writer = index.stage().unwrap();
            writer.add(&chunk("https://docs.example.com/b", 0, "tiers")).unwrap();
        }

        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.search("tiers", 5).unwrap().len(), 1);
    }

    #[test]
    fn test_committed_index_stays_hidden_until_published() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Bm25Index::open(tmp.path()).unwrap();
        build(&index, &[chunk("https://docs.example.com/a", 0, "tiers")]);

        let mut writer = index.stage().unwrap();
        writer.add(&chunk("https://docs.example.com/b", 0, "coupons")).unwrap();
        writer.add(&chunk("https://docs.example.com/c", 0, "coupons")).unwrap();
        assert_eq!(writer.commit().unwrap(), 2);
        assert!(index.search("coupons", 5).unwrap().is_empty());

        writer.publish().unwrap();
        assert_eq!(index.search("coupons", 5).unwrap().len(), 2);
        assert!(index.search("tiers", 5).unwrap().is_empty());
    }

    #[test]
    fn test_publish_without_commit_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Bm25Index::open(tmp.path()).unwrap();
        let mut writer = index.stage().unwrap();
        writer.add(&chunk("https://docs.example.com/a", 0, "tiers")).unwrap();

        assert!(matches!(writer.publish(), Err(Error::KeywordIndex(_))));
        assert_eq!(index.count().unwrap(), 0);
    }
}
