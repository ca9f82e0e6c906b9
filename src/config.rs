//! Process-level settings for the `charter` binary

use clap::ValueEnum;
use serde::Serialize;
use std::env;
use std::path::PathBuf;

use charter_core::{Error, Result};
use charter_rag::DEFAULT_QDRANT_URL;
use charter_server::{DEFAULT_BIND, DEFAULT_MAX_BODY_SIZE, DEFAULT_PORT};

pub const DEFAULT_STORAGE_DIR: &str = "./charter_index";
pub const DEFAULT_COLLECTION: &str = "charter";

/// Where the vector index lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Local feature hashing, no network
    Hash,
    /// Gemini text-embedding-004
    Gemini,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub storage_dir: PathBuf,
    pub backend: Backend,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub embedder: EmbedderKind,
    pub bind: String,
    pub port: u16,
    pub max_body_size: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("CHARTER_BACKEND") {
            Some(raw) => choice::<Backend>("CHARTER_BACKEND", &raw)?,
            None => Backend::Local,
        };

        let embedder = match lookup("CHARTER_EMBEDDER") {
            Some(raw) => choice::<EmbedderKind>("CHARTER_EMBEDDER", &raw)?,
            None => EmbedderKind::Hash,
        };

        let port = match lookup("CHARTER_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                Error::Configuration(format!("CHARTER_PORT must be a port number, got '{}'", raw))
            })?,
            None => DEFAULT_PORT,
        };

        let max_body_size = match lookup("CHARTER_MAX_BODY_SIZE") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(Error::Configuration(format!(
                        "CHARTER_MAX_BODY_SIZE must be a positive byte count, got '{}'",
                        raw
                    )));
                }
            },
            None => DEFAULT_MAX_BODY_SIZE,
        };

        Ok(Self {
            storage_dir: lookup("CHARTER_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
            backend,
            qdrant_url: lookup("QDRANT_URL").unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            qdrant_collection: lookup("QDRANT_COLLECTION")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            embedder,
            bind: lookup("CHARTER_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            port,
            max_body_size,
        })
    }
}

fn choice<T: ValueEnum>(key: &str, raw: &str) -> Result<T> {
    T::from_str(raw.trim(), true).map_err(|_| {
        let allowed: Vec<String> = T::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        Error::Configuration(format!(
            "{} must be one of {}, got '{}'",
            key,
            allowed.join(", "),
            raw
        ))
    })
}
