//! Sliding character window over a document's text.
//!
//! Window `i` starts at char `i * stride` and is at most `size` chars long. The final
//! window always reaches the end of the text, so short trailing content is kept.
//! Consecutive windows share exactly `size - stride` chars.

use crate::models::{Chunk, Document};

pub struct Chunks<'a> {
    doc: &'a Document,
    size: usize,
    stride: usize,
    /// Byte index of the next window start
    byte_start: usize,
    /// Char index of the next window start
    char_start: usize,
    position: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    pub(crate) fn new(doc: &'a Document, size: usize, stride: usize) -> Self {
        Self {
            doc,
            size,
            stride,
            byte_start: 0,
            char_start: 0,
            position: 0,
            done: doc.raw_text.is_empty(),
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let rest = &self.doc.raw_text[self.byte_start..];
        let end = byte_offset_of_char(rest, self.size);

        let chunk = Chunk {
            id: Chunk::make_id(&self.doc.url, self.position),
            source_url: self.doc.url.clone(),
            title: self.doc.title.clone(),
            text: rest[..end].to_string(),
            position: self.position,
            offset: self.char_start,
        };

        if end == rest.len() {
            self.done = true;
        } else {
            self.byte_start += byte_offset_of_char(rest, self.stride);
            self.char_start += self.stride;
        }
        self.position += 1;

        Some(chunk)
    }
}

/// Byte offset of the `n`th char of `s`, or `s.len()` if it has fewer chars.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
