//! Recursive character chunking with overlap

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use charter_core::{Chunk, ChunkId, Document, Error, Result};

/// Chunking parameters. Sizes are counted in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub max_chunk_size: usize,
    pub overlap_size: usize,
    /// Split points, highest priority first
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap_size: 100,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ".".to_string(),
                " ".to_string(),
            ],
        }
    }
}

impl ChunkerConfig {
    pub fn new(max_chunk_size: usize, overlap_size: usize) -> Self {
        Self {
            max_chunk_size,
            overlap_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(Error::Configuration(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(Error::Configuration(format!(
                "overlap_size ({}) must be smaller than max_chunk_size ({})",
                self.overlap_size, self.max_chunk_size
            )));
        }
        if self.separators.iter().any(|s| s.is_empty()) {
            return Err(Error::Configuration(
                "separators must not be empty strings".to_string(),
            ));
        }
        Ok(())
    }

    /// Room left for fresh text once the overlap prefix is accounted for
    fn core_limit(&self) -> usize {
        self.max_chunk_size - self.overlap_size
    }
}

/// Splits documents into overlapping chunks that respect natural boundaries
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Cut `document` into chunks, in document order
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = document.content.as_str();
        if text.is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        self.split(text, 0, text.len(), 0, &mut pieces);
        let cores = self.merge(text, &pieces);

        let mut chunks = Vec::with_capacity(cores.len());
        let mut previous: Option<(usize, usize)> = None;

        for (position, (core_start, core_end)) in cores.into_iter().enumerate() {
            // an oversized unit leaves less room for the repeated tail
            let fresh_len = text[core_start..core_end].chars().count();
            let overlap = self
                .config
                .overlap_size
                .min(self.config.max_chunk_size.saturating_sub(fresh_len));
            let start = match previous {
                Some((prev_start, prev_end)) => overlap_start(text, prev_start, prev_end, overlap),
                None => core_start,
            };
            previous = Some((core_start, core_end));

            chunks.push(Chunk {
                id: ChunkId::new(document.id.clone(), position),
                text: text[start..core_end].to_string(),
                start,
                end: core_end,
                overlap: core_start - start,
                metadata: chunk_metadata(document, position),
            });
        }

        chunks
    }

    /// Cut every document, keeping document order
    pub fn chunk_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.chunk(d)).collect()
    }

    /// Recursively split `text[start..end]` into byte ranges no longer than
    /// the core limit where a separator allows it
    fn split(
        &self,
        text: &str,
        start: usize,
        end: usize,
        level: usize,
        out: &mut Vec<(usize, usize)>,
    ) {
        let slice = &text[start..end];
        if slice.chars().count() <= self.config.core_limit() {
            out.push((start, end));
            return;
        }

        let Some(separator) = self.config.separators.get(level) else {
            // atomic unit, emitted whole
            out.push((start, end));
            return;
        };

        let mut offset = start;
        let parts: Vec<(usize, usize)> = slice
            .split_inclusive(separator.as_str())
            .map(|part| {
                let range = (offset, offset + part.len());
                offset += part.len();
                range
            })
            .collect();

        if parts.len() == 1 {
            self.split(text, start, end, level + 1, out);
            return;
        }

        for (part_start, part_end) in parts {
            self.split(text, part_start, part_end, level + 1, out);
        }
    }

    /// Greedily merge adjacent pieces up to the core limit
    fn merge(&self, text: &str, pieces: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let limit = self.config.core_limit();
        let mut merged = Vec::new();
        let mut current: Option<(usize, usize, usize)> = None;

        for &(start, end) in pieces {
            let len = text[start..end].chars().count();
            current = match current {
                Some((group_start, _, group_len)) if group_len + len <= limit => {
                    Some((group_start, end, group_len + len))
                }
                Some((group_start, group_end, _)) => {
                    merged.push((group_start, group_end));
                    Some((start, end, len))
                }
                None => Some((start, end, len)),
            };
        }

        if let Some((group_start, group_end, _)) = current {
            merged.push((group_start, group_end));
        }
        merged
    }
}

/// Byte offset where the trailing `overlap` characters of `text[start..end]` begin
fn overlap_start(text: &str, start: usize, end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return end;
    }
    text[start..end]
        .char_indices()
        .rev()
        .nth(overlap - 1)
        .map(|(i, _)| start + i)
        .unwrap_or(start)
}

fn chunk_metadata(document: &Document, position: usize) -> Value {
    let mut metadata = match &document.metadata {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    metadata
        .entry("source")
        .or_insert_with(|| json!(document.id));
    metadata.insert("title".to_string(), json!(document.title));
    metadata.insert("chunk".to_string(), json!(position));
    Value::Object(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc(content: &str) -> Document {
        Document {
            id: "Page-1".to_string(),
            title: "Constitution".to_string(),
            content: content.to_string(),
            metadata: json!({"page": 1}),
        }
    }

    fn rebuild(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.fresh_text()).collect()
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(matches!(
            Chunker::new(ChunkerConfig::new(100, 100)),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Chunker::new(ChunkerConfig::new(0, 0)),
            Err(Error::Configuration(_))
        ));
        assert!(Chunker::new(ChunkerConfig::new(100, 99)).is_ok());
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        assert!(chunker.chunk(&doc("")).is_empty());
    }

    #[test]
    fn test_short_document_is_one_chunk() {
        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        let chunks = chunker.chunk(&doc("Article 1. Pakistan shall be a Federal Republic."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].overlap, 0);
        assert_eq!(chunks[0].id, ChunkId::new("Page-1", 0));
        assert_eq!(chunks[0].source(), "Page-1");
        assert_eq!(chunks[0].metadata["page"], 1);
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let chunker = Chunker::new(ChunkerConfig::new(40, 5)).unwrap();
        let text = "First paragraph is here.\n\nSecond paragraph is here.";
        let chunks = chunker.chunk(&doc(text));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "First paragraph is here.\n\n");
        assert!(chunks[1].fresh_text().starts_with("Second"));
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn test_overlap_repeats_previous_tail() {
        let chunker = Chunker::new(ChunkerConfig::new(30, 6)).unwrap();
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = chunker.chunk(&doc(text));

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let shared = &pair[1].text[..pair[1].overlap];
            assert!(pair[0].text.ends_with(shared));
            assert!(shared.chars().count() <= 6);
        }
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn test_atomic_unit_emitted_whole() {
        let chunker = Chunker::new(ChunkerConfig::new(10, 2)).unwrap();
        let text = "tiny abcdefghijklmnopqrstuvwxyz end";
        let chunks = chunker.chunk(&doc(text));

        assert!(
            chunks
                .iter()
                .any(|c| c.fresh_text().contains("abcdefghijklmnopqrstuvwxyz"))
        );
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn test_overlap_shrinks_to_fit_long_unit() {
        let chunker = Chunker::new(ChunkerConfig::new(10, 3)).unwrap();
        let text = "aaaa bbbbbbbbb";
        let chunks = chunker.chunk(&doc(text));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, " bbbbbbbbb");
        assert_eq!(chunks[1].overlap, 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn test_byte_ranges_match_text() {
        let chunker = Chunker::new(ChunkerConfig::new(20, 4)).unwrap();
        let text = "Článek první. Ústava státu je zde.\nŘádek další s háčky.";
        let document = doc(text);
        for chunk in chunker.chunk(&document) {
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
        }
    }

    fn document_text() -> impl Strategy<Value = String> {
        let word = prop_oneof![
            6 => "[a-zA-Zé0-9]{1,8}",
            1 => "[a-z]{20,90}",
        ];
        let separator = prop::sample::select(vec![" ", "\n", "\n\n", ". ", ".", "  "]);
        prop::collection::vec((word, separator), 0..120).prop_map(|parts| {
            parts
                .into_iter()
                .map(|(w, s)| format!("{}{}", w, s))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_chunks_rebuild_document(text in document_text(), max in 30usize..80, overlap in 0usize..15) {
            let chunker = Chunker::new(ChunkerConfig::new(max, overlap)).unwrap();
            let chunks = chunker.chunk(&doc(&text));

            prop_assert_eq!(rebuild(&chunks), text.clone());
            for (position, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.id.position, position);
                prop_assert!(
                    chunk.text.chars().count() <= max
                        || chunk.fresh_text().chars().count() > max
                );
            }
        }
    }
}
