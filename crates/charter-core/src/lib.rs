//! Core traits and types for charter
//!
//! This crate defines the capability-facing interfaces shared by the rest of
//! the workspace: LLM providers, embedders, vector indexes, and the document,
//! chunk, and passage types that flow between them. Keeping them here lets
//! every component be swapped or mocked independently.

pub mod document;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod types;
pub mod vector_index;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use document::{Chunk, ChunkId, Document};
pub use embedding::{Embedder, cosine_similarity};
pub use error::{Error, Result};
pub use llm::{GenerationConfig, GenerationResult, LLMProvider};
pub use types::*;
pub use vector_index::{
    IndexBackend, IndexManifest, IndexWriter, MANIFEST_FORMAT_VERSION, ScoredEntry, VectorIndex,
};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockLlm;
