//! Source documents and the chunks cut from them

use serde::{Deserialize, Serialize};
use std::fmt;

/// A page (or whole file) of the source text. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier, e.g. `Page-12`
    pub id: String,
    pub title: String,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// Identity of a chunk: the document it came from plus its sequence position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub document_id: String,
    pub position: usize,
}

impl ChunkId {
    pub fn new(document_id: impl Into<String>, position: usize) -> Self {
        Self {
            document_id: document_id.into(),
            position,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document_id, self.position)
    }
}

/// A contiguous slice of a [`Document`].
///
/// `start..end` is the byte range inside the document content. The first
/// `overlap` bytes of `text` repeat the tail of the previous chunk, so
/// concatenating `text[overlap..]` over all chunks of a document yields the
/// document back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub overlap: usize,
    pub metadata: serde_json::Value,
}

impl Chunk {
    /// The part of the chunk not shared with its predecessor
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap..]
    }

    /// Citation label, taken from the `source` metadata when present
    pub fn source(&self) -> &str {
        self.metadata
            .get("source")
            .and_then(|s| s.as_str())
            .unwrap_or(&self.id.document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(metadata: serde_json::Value) -> Chunk {
        Chunk {
            id: ChunkId::new("Page-3", 1),
            text: "tail of previous. Fresh text".to_string(),
            start: 40,
            end: 68,
            overlap: 18,
            metadata,
        }
    }

    #[test]
    fn test_chunk_id_display() {
        assert_eq!(ChunkId::new("Page-3", 7).to_string(), "Page-3#7");
    }

    #[test]
    fn test_fresh_text_skips_overlap() {
        assert_eq!(chunk(json!({})).fresh_text(), "Fresh text");
    }

    #[test]
    fn test_source_prefers_metadata() {
        assert_eq!(chunk(json!({"source": "Page-4"})).source(), "Page-4");
        assert_eq!(chunk(json!({})).source(), "Page-3");
    }
}
