//! On-disk document store: one markdown file per crawled page with a JSON header.
//!
//! ```text
//! ---
//! {"url":"https://docs.example.com/a","title":"A","fetched_at":"2024-05-01T12:00:00Z"}
//! ---
//!
//! # A
//! ...
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Document;

const HEADER_FENCE: &str = "---\n";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    fetched_at: Option<DateTime<Utc>>,
}

pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a document, replacing any earlier copy of the same URL.
    pub fn save(&self, doc: &Document) -> Result<PathBuf> {
        if doc.url.trim().is_empty() {
            return Err(Error::Documents("Document URL is required".to_string()));
        }
        let header = Header {
            url: doc.url.clone(),
            title: doc.title.clone(),
            fetched_at: Some(doc.fetched_at),
        };
        let data = format!(
            "{HEADER_FENCE}{}\n{HEADER_FENCE}\n{}",
            serde_json::to_string(&header)?,
            doc.raw_text
        );

        let path = self.dir.join(format!("{}.md", slug(&doc.url)));
        let tmp_path = path.with_extension("md.tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(path)
    }

    /// Load every stored document, sorted by URL. Files with an empty body are skipped.
    pub fn load_all(&self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            match load_file(&path) {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => tracing::debug!("Skipping empty document {}", path.display()),
                Err(e) => tracing::warn!("Skipping unreadable document {}: {e}", path.display()),
            }
        }
        // Newest copy wins if a URL is stored under more than one file name.
        docs.sort_by(|a, b| a.url.cmp(&b.url).then(b.fetched_at.cmp(&a.fetched_at)));
        docs.dedup_by(|later, kept| later.url == kept.url);
        Ok(docs)
    }
}

/// Characters of the URL kept in a file name. The hash suffix keeps names unique.
const SLUG_CHARS: usize = 80;

/// File name stem for a URL: a readable prefix plus a short hash of the full URL.
///
/// Flattening alone is lossy (`/a/b` and `/a_b` would share a file) and long URLs
/// overflow the file name limit, so the prefix is only for humans browsing the store.
pub fn slug(url: &str) -> String {
    let readable: String = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '#' | ':' | '*' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() || !c.is_ascii() => '_',
            c => c,
        })
        .take(SLUG_CHARS)
        .collect();
    let hash = Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes()).simple().to_string();
    format!("{readable}-{}", &hash[..12])
}

fn load_file(path: &Path) -> Result<Option<Document>> {
    let text = std::fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let (header, body) = split_header(&text);
    let header = header.and_then(|h| serde_json::from_str::<Header>(h).ok());

    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }

    let (url, title, fetched_at) = match header {
        Some(h) => (h.url, h.title, h.fetched_at),
        None => (stem.clone(), stem, None),
    };
    let fetched_at = match fetched_at {
        Some(ts) => ts,
        None => std::fs::metadata(path)?.modified()?.into(),
    };

    Ok(Some(Document {
        url,
        title,
        raw_text: body.to_string(),
        fetched_at,
    }))
}

fn split_header(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text.strip_prefix(HEADER_FENCE) else {
        return (None, text);
    };
    match rest.find("\n---\n") {
        Some(end) => (Some(rest[..end].trim()), &rest[end + 5..]),
        None => (None, text),
    }
}
