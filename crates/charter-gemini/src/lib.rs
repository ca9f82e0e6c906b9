//! Google Gemini integration for charter
//!
//! This crate provides the Gemini implementations of the `LLMProvider` and
//! `Embedder` traits.

mod client;
mod config;
mod embedding;
mod http;

#[cfg(test)]
mod tests;

pub use client::GeminiClient;
pub use config::{DEFAULT_API_URL, DEFAULT_EMBEDDING_MODEL, DEFAULT_MODEL, GeminiConfig};
pub use embedding::GeminiEmbedder;

// Re-export core types for convenience
pub use charter_core::{Embedder, Error, GenerationConfig, GenerationResult, LLMProvider, Result};
