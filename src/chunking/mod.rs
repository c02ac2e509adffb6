//! Document chunking: fixed-size character windows with overlap.

pub mod window;

pub use window::Chunks;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::models::Document;

/// Splits documents into overlapping windows of `size` characters.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.size == 0 || config.overlap >= config.size {
            return Err(Error::Config(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                config.overlap, config.size
            )));
        }
        Ok(Self {
            size: config.size,
            overlap: config.overlap,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily chunk one document. Chunks never span documents.
    pub fn chunks<'a>(&self, doc: &'a Document) -> Chunks<'a> {
        Chunks::new(doc, self.size, self.size - self.overlap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let err = Chunker::new(ChunkingConfig {
            size: 100,
            overlap: 100,
        });
        assert!(err.is_err());
        assert!(Chunker::new(ChunkingConfig { size: 0, overlap: 0 }).is_err());
    }

    #[test]
    fn test_default_config_accepted() {
        let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
        assert_eq!(chunker.size(), 1200);
        assert_eq!(chunker.overlap(), 180);
    }
}
