//! Retrieval-augmented generation building blocks for charter
//!
//! Offline, a source document is loaded, chunked, embedded and persisted as a
//! vector index. At query time the [`Retriever`] embeds the question (and,
//! optionally, LLM reformulations of it), searches the index and returns a
//! ranked, deduplicated passage set.

mod chunker;
mod embedder;
mod expander;
mod ingest;
mod loader;
mod local_index;
mod mmr;
mod qdrant_index;
mod retriever;
mod storage;


pub use chunker::{Chunker, ChunkerConfig};
pub use embedder::HashEmbedder;
pub use expander::{DEFAULT_EXPANSIONS, QueryExpander, expansion_prompt, parse_reformulations};
pub use ingest::{DEFAULT_BATCH_SIZE, IndexTarget, IngestionPipeline, IngestionReport, fingerprint};
pub use loader::{SourceFile, SourceKind, split_pages};
pub use local_index::{LocalIndexWriter, LocalVectorIndex, StoredEntry};
pub use mmr::{MmrConfig, mmr_select};
pub use qdrant_index::{DEFAULT_QDRANT_URL, QdrantIndexWriter, QdrantVectorIndex, collection_name, point_id};
pub use retriever::{RetrievalRequest, Retriever, merge};
pub use storage::{BuildInfo, MANIFEST_FILE, open_index, read_manifest, write_manifest};

// Re-export core types for convenience
pub use charter_core::{
    Chunk, ChunkId, Document, Embedder, Error, IndexManifest, Result, RetrievedPassage,
    ScoredEntry, VectorIndex,
};
