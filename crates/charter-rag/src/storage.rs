//! On-disk layout of an index directory and opening a committed index

use chrono::Utc;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use charter_core::{
    Embedder, Error, IndexBackend, IndexManifest, MANIFEST_FORMAT_VERSION, Result, VectorIndex,
};

use crate::local_index::LocalVectorIndex;
use crate::qdrant_index::QdrantVectorIndex;

pub const MANIFEST_FILE: &str = "manifest.json";

/// What an ingestion run is building; becomes the manifest on commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub embedding_model: String,
    pub dimensions: usize,
    pub fingerprint: String,
    pub source: String,
}

impl BuildInfo {
    pub fn manifest(&self, chunk_count: usize, backend: IndexBackend) -> IndexManifest {
        IndexManifest {
            format_version: MANIFEST_FORMAT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dimensions: self.dimensions,
            document_fingerprint: self.fingerprint.clone(),
            source: self.source.clone(),
            chunk_count,
            created_at: Utc::now(),
            backend,
        }
    }
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

pub fn entries_file_name(fingerprint: &str) -> String {
    format!("entries-{}.json", fingerprint)
}

/// Read the committed manifest, `None` when the directory holds no index
pub fn read_manifest(dir: &Path) -> Result<Option<IndexManifest>> {
    let path = manifest_path(dir);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Retrieval(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| Error::Retrieval(format!("corrupt manifest {}: {}", path.display(), e)))
}

/// Publish `manifest`; after this returns the new index is the committed one
pub fn write_manifest(dir: &Path, manifest: &IndexManifest) -> Result<()> {
    write_json_atomic(dir, MANIFEST_FILE, manifest)
}

/// Serialize `value` to `dir/name` through a temp file in the same directory
/// and a rename, so readers see either the old file or the complete new one
pub fn write_json_atomic<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut file, value)?;
    file.flush()?;
    file.as_file().sync_all()?;

    file.persist(dir.join(name))
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Open whatever index `dir` holds for searching with `embedder`.
///
/// A directory without a manifest opens as an empty index. A manifest
/// written for another embedding model or dimensionality is rejected with
/// [`Error::IndexIncompatible`].
pub async fn open_index(dir: &Path, embedder: &dyn Embedder) -> Result<Arc<dyn VectorIndex>> {
    let Some(manifest) = read_manifest(dir)? else {
        warn!(
            storage = %dir.display(),
            "no index manifest found; serving an empty index (run `charter ingest` first)"
        );
        return Ok(Arc::new(LocalVectorIndex::empty()));
    };

    manifest.check_compatible(embedder.model_id(), embedder.dimensions())?;

    info!(
        source = %manifest.source,
        chunks = manifest.chunk_count,
        model = %manifest.embedding_model,
        "opening index"
    );

    match manifest.backend.clone() {
        IndexBackend::Local { entries_file } => {
            let index = LocalVectorIndex::load(dir, &entries_file, manifest).await?;
            Ok(Arc::new(index))
        }
        IndexBackend::Qdrant { url, collection } => {
            let index = QdrantVectorIndex::connect(&url, &collection, manifest)?;
            Ok(Arc::new(index))
        }
    }
}
