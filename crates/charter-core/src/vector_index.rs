//! Vector index traits and the manifest persisted alongside every index

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Chunk, Error, Result};

/// Bumped whenever the on-disk layout changes
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// A chunk returned by a search together with its cosine relevance to the query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub chunk: Chunk,
    pub score: f32,
}

/// Where the entries of an index physically live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexBackend {
    Local { entries_file: String },
    Qdrant { url: String, collection: String },
}

/// Describes a committed index. Written last during ingestion, so its
/// presence means the entries it points at are complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimensions: usize,
    pub document_fingerprint: String,
    pub source: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub backend: IndexBackend,
}

impl IndexManifest {
    /// Verify that vectors from `model_id` can be searched against this index
    pub fn check_compatible(&self, model_id: &str, dimensions: usize) -> Result<()> {
        if self.format_version != MANIFEST_FORMAT_VERSION {
            return Err(Error::IndexIncompatible(format!(
                "manifest format {} is not supported (expected {})",
                self.format_version, MANIFEST_FORMAT_VERSION
            )));
        }
        if self.embedding_model != model_id {
            return Err(Error::IndexIncompatible(format!(
                "index was built with embedding model '{}' but '{}' is configured",
                self.embedding_model, model_id
            )));
        }
        if self.dimensions != dimensions {
            return Err(Error::IndexIncompatible(format!(
                "index vectors have {} dimensions but the embedder produces {}",
                self.dimensions, dimensions
            )));
        }
        Ok(())
    }
}

/// Read side of a vector index. Read-only once opened, so any number of
/// requests may search concurrently.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` entries, most relevant first. With `diversify` the results
    /// trade relevance against redundancy (maximal marginal relevance).
    /// An empty index yields an empty result.
    async fn search(&self, query: &[f32], k: usize, diversify: bool) -> Result<Vec<ScoredEntry>>;

    /// Number of indexed entries
    async fn count(&self) -> Result<usize>;

    /// Manifest of the committed index, `None` when nothing was ingested yet
    fn manifest(&self) -> Option<&IndexManifest>;
}

/// Write side used by the ingestion job. Entries stay invisible to readers
/// until [`IndexWriter::commit`] succeeds.
#[async_trait]
pub trait IndexWriter: Send {
    /// Stage one entry
    async fn insert(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<()>;

    /// Persist every staged entry and publish the manifest
    async fn commit(&mut self) -> Result<IndexManifest>;

    /// Drop staged entries after a failed ingestion
    async fn abort(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> IndexManifest {
        IndexManifest {
            format_version: MANIFEST_FORMAT_VERSION,
            embedding_model: "charter-hash-v1-384".to_string(),
            dimensions: 384,
            document_fingerprint: "f00d".to_string(),
            source: "constitution.pdf".to_string(),
            chunk_count: 12,
            created_at: Utc::now(),
            backend: IndexBackend::Local {
                entries_file: "entries-f00d.json".to_string(),
            },
        }
    }

    #[test]
    fn test_compatible_manifest() {
        assert!(manifest().check_compatible("charter-hash-v1-384", 384).is_ok());
    }

    #[test]
    fn test_model_mismatch_rejected() {
        let err = manifest()
            .check_compatible("text-embedding-004", 384)
            .unwrap_err();
        assert!(matches!(err, Error::IndexIncompatible(_)));
        assert!(err.to_string().contains("text-embedding-004"));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let err = manifest()
            .check_compatible("charter-hash-v1-384", 768)
            .unwrap_err();
        assert!(err.to_string().contains("768"));
    }

    #[test]
    fn test_backend_serializes_tagged() {
        let backend = IndexBackend::Qdrant {
            url: "http://localhost:6334".to_string(),
            collection: "charter_ab12".to_string(),
        };
        let json = serde_json::to_value(&backend).unwrap();
        assert_eq!(json["kind"], "qdrant");
        assert_eq!(json["collection"], "charter_ab12");
    }
}
