//! File-backed vector index searched in memory

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use charter_core::{
    Chunk, Error, IndexBackend, IndexManifest, IndexWriter, Result, ScoredEntry, VectorIndex,
    cosine_similarity,
};

use crate::mmr::{MmrConfig, mmr_select};
use crate::storage::{BuildInfo, entries_file_name, write_json_atomic, write_manifest};

/// One indexed entry as stored in `entries-<fingerprint>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Read-only index over entries loaded from disk.
///
/// Never mutated after construction, so it is shared across requests
/// behind an `Arc` without locking.
#[derive(Debug, Default)]
pub struct LocalVectorIndex {
    entries: Vec<StoredEntry>,
    manifest: Option<IndexManifest>,
    mmr: MmrConfig,
}

impl LocalVectorIndex {
    /// Index with no entries; every search returns nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index directly from entries, mostly useful in tests
    pub fn from_entries(entries: Vec<StoredEntry>, manifest: Option<IndexManifest>) -> Self {
        Self {
            entries,
            manifest,
            mmr: MmrConfig::default(),
        }
    }

    /// Load the entries file a committed manifest points at
    pub async fn load(dir: &Path, entries_file: &str, manifest: IndexManifest) -> Result<Self> {
        let path = dir.join(entries_file);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Retrieval(format!("cannot read {}: {}", path.display(), e)))?;

        let entries: Vec<StoredEntry> = serde_json::from_slice(&raw)
            .map_err(|e| Error::Retrieval(format!("corrupt index {}: {}", path.display(), e)))?;

        if entries.len() != manifest.chunk_count {
            return Err(Error::Retrieval(format!(
                "{} holds {} entries but the manifest records {}",
                path.display(),
                entries.len(),
                manifest.chunk_count
            )));
        }

        info!(entries = entries.len(), path = %path.display(), "loaded local index");
        Ok(Self::from_entries(entries, Some(manifest)))
    }

    /// Every entry scored against `query`, most relevant first. Equal scores
    /// keep insertion order.
    fn ranked(&self, query: &[f32]) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn search(&self, query: &[f32], k: usize, diversify: bool) -> Result<Vec<ScoredEntry>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let dimensions = self.entries[0].vector.len();
        if query.len() != dimensions {
            return Err(Error::Retrieval(format!(
                "query has {} dimensions but the index holds {}",
                query.len(),
                dimensions
            )));
        }

        let mut ranked = self.ranked(query);

        let picked: Vec<(usize, f32)> = if diversify {
            ranked.truncate(self.mmr.candidates_for(k));
            let vectors: Vec<&[f32]> = ranked
                .iter()
                .map(|(i, _)| self.entries[*i].vector.as_slice())
                .collect();
            mmr_select(query, &vectors, k, self.mmr.lambda)
                .into_iter()
                .map(|pos| ranked[pos])
                .collect()
        } else {
            ranked.truncate(k);
            ranked
        };

        debug!(k, diversify, hits = picked.len(), "local index search");

        Ok(picked
            .into_iter()
            .map(|(i, score)| ScoredEntry {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn manifest(&self) -> Option<&IndexManifest> {
        self.manifest.as_ref()
    }
}

/// Stages entries in memory and publishes them to a storage directory on commit
pub struct LocalIndexWriter {
    dir: PathBuf,
    info: BuildInfo,
    staged: Vec<StoredEntry>,
}

impl LocalIndexWriter {
    pub fn new(dir: impl Into<PathBuf>, info: BuildInfo) -> Self {
        Self {
            dir: dir.into(),
            info,
            staged: Vec::new(),
        }
    }

    /// Remove entry files no committed manifest refers to any more
    fn remove_stale_entries(dir: &Path, keep: &str) {
        let Ok(listing) = std::fs::read_dir(dir) else {
            return;
        };
        for item in listing.flatten() {
            let name = item.file_name().to_string_lossy().to_string();
            if name.starts_with("entries-") && name.ends_with(".json") && name != keep {
                if let Err(e) = std::fs::remove_file(item.path()) {
                    warn!(file = %name, error = %e, "could not remove stale index file");
                }
            }
        }
    }
}

#[async_trait]
impl IndexWriter for LocalIndexWriter {
    async fn insert(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.info.dimensions {
            return Err(Error::Ingestion(format!(
                "chunk {} has a {}-dimensional vector, expected {}",
                chunk.id,
                vector.len(),
                self.info.dimensions
            )));
        }
        self.staged.push(StoredEntry { chunk, vector });
        Ok(())
    }

    async fn commit(&mut self) -> Result<IndexManifest> {
        let entries_file = entries_file_name(&self.info.fingerprint);
        let manifest = self.info.manifest(
            self.staged.len(),
            IndexBackend::Local {
                entries_file: entries_file.clone(),
            },
        );

        let dir = self.dir.clone();
        let staged = std::mem::take(&mut self.staged);
        let published = manifest.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            write_json_atomic(&dir, &entries_file, &staged)?;
            write_manifest(&dir, &published)?;
            Self::remove_stale_entries(&dir, &entries_file);
            Ok(())
        })
        .await
        .map_err(|e| Error::Ingestion(format!("index writer task failed: {}", e)))??;

        info!(
            entries = manifest.chunk_count,
            storage = %self.dir.display(),
            "committed local index"
        );
        Ok(manifest)
    }

    async fn abort(&mut self) {
        self.staged.clear();
    }
}
