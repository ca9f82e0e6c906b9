//! One-shot ingestion: load, chunk, embed, persist

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use charter_core::{Chunk, Embedder, Error, IndexWriter, Result};

use crate::chunker::{Chunker, ChunkerConfig};
use crate::loader::SourceFile;
use crate::local_index::LocalIndexWriter;
use crate::qdrant_index::QdrantIndexWriter;
use crate::storage::{BuildInfo, read_manifest};

/// Where ingested entries are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexTarget {
    Local,
    Qdrant { url: String, base_collection: String },
}

impl IndexTarget {
    fn writer(&self, dir: &Path, info: BuildInfo) -> Result<Box<dyn IndexWriter>> {
        match self {
            IndexTarget::Local => Ok(Box::new(LocalIndexWriter::new(dir, info))),
            IndexTarget::Qdrant {
                url,
                base_collection,
            } => Ok(Box::new(QdrantIndexWriter::new(
                url,
                base_collection,
                dir,
                info,
            )?)),
        }
    }
}

/// Summary of a finished ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub source: String,
    pub documents: usize,
    pub chunks: usize,
    pub embedding_model: String,
    pub dimensions: usize,
    pub fingerprint: String,
    pub storage: String,
}

/// Identity of an ingestion: the same source bytes, chunking, embedding
/// model and document title always give the same fingerprint
pub fn fingerprint(
    bytes: &[u8],
    chunker: &ChunkerConfig,
    embedding_model: &str,
    title: &str,
) -> Result<String> {
    let mut context = md5::Context::new();
    context.consume(bytes);
    context.consume([0u8]);
    context.consume(serde_json::to_vec(chunker)?);
    context.consume([0u8]);
    context.consume(embedding_model.as_bytes());
    context.consume([0u8]);
    context.consume(title.as_bytes());
    Ok(format!("{:x}", context.compute()))
}

/// Chunks embedded per embedder call
pub const DEFAULT_BATCH_SIZE: usize = 32;

pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    title: String,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, chunker: Chunker, title: impl Into<String>) -> Self {
        Self {
            embedder,
            chunker,
            title: title.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Ingest `source` into `storage`.
    ///
    /// Fails with [`Error::AlreadyIngested`] when the committed index already
    /// holds this exact source, chunking and model, unless `force` is set, in
    /// which case the index is rebuilt from scratch. Nothing becomes visible
    /// to readers unless the whole run succeeds.
    pub async fn run(
        &self,
        source: &Path,
        storage: &Path,
        target: &IndexTarget,
        force: bool,
    ) -> Result<IngestionReport> {
        let file = SourceFile::read(source).await?;
        let fingerprint = fingerprint(
            &file.bytes,
            self.chunker.config(),
            self.embedder.model_id(),
            &self.title,
        )?;

        match read_manifest(storage) {
            Ok(Some(existing)) if existing.document_fingerprint == fingerprint => {
                if !force {
                    return Err(Error::AlreadyIngested { fingerprint });
                }
                info!(fingerprint = %fingerprint, "rebuilding existing index (--force)");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "ignoring unreadable manifest; it will be replaced"),
        }

        let documents = file.documents(&self.title).await?;
        let chunks = self.chunker.chunk_all(&documents);
        if chunks.is_empty() {
            return Err(Error::Ingestion(format!(
                "{} produced no chunks",
                source.display()
            )));
        }

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            model = %self.embedder.model_id(),
            "embedding chunks"
        );

        let build = BuildInfo {
            embedding_model: self.embedder.model_id().to_string(),
            dimensions: self.embedder.dimensions(),
            fingerprint: fingerprint.clone(),
            source: file.file_name(),
        };

        let mut writer = target.writer(storage, build)?;
        if let Err(e) = self.write_all(writer.as_mut(), chunks).await {
            writer.abort().await;
            return Err(e);
        }

        let manifest = match writer.commit().await {
            Ok(manifest) => manifest,
            Err(e) => {
                writer.abort().await;
                return Err(e);
            }
        };

        Ok(IngestionReport {
            source: source.display().to_string(),
            documents: documents.len(),
            chunks: manifest.chunk_count,
            embedding_model: manifest.embedding_model,
            dimensions: manifest.dimensions,
            fingerprint,
            storage: storage_label(storage),
        })
    }

    async fn write_all(&self, writer: &mut dyn IndexWriter, chunks: Vec<Chunk>) -> Result<()> {
        let total = chunks.len();
        let mut done = 0;
        let mut remaining = chunks.into_iter().peekable();

        while remaining.peek().is_some() {
            let batch: Vec<Chunk> = remaining.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            let vectors = self.embedder.embed_batch(&texts).await.map_err(|e| match e {
                Error::Embedding(_) => e,
                other => Error::Embedding(other.to_string()),
            })?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.into_iter().zip(vectors) {
                writer.insert(chunk, vector).await?;
            }

            done += texts.len();
            info!(done, total, "embedded batch");
        }
        Ok(())
    }
}

fn storage_label(storage: &Path) -> String {
    std::fs::canonicalize(storage)
        .unwrap_or_else(|_| PathBuf::from(storage))
        .display()
        .to_string()
}
