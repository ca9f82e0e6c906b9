//! Error types for charter

use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types shared by every charter crate
#[derive(Error, Debug)]
pub enum Error {
    /// Source document unreadable or unparseable; aborts the ingestion job
    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    /// The same source was already ingested with the same model and chunking
    #[error("Document already ingested (fingerprint {fingerprint}); pass --force to rebuild")]
    AlreadyIngested { fingerprint: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Vector index unreachable or corrupt
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// The persisted index was built with another embedding model or dimensionality
    #[error("Index incompatible: {0}")]
    IndexIncompatible(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Short machine-readable name, used in HTTP error bodies and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Ingestion(_) => "ingestion_failed",
            Error::AlreadyIngested { .. } => "already_ingested",
            Error::Embedding(_) => "embedding_failed",
            Error::Retrieval(_) => "retrieval_failed",
            Error::IndexIncompatible(_) => "index_incompatible",
            Error::Generation(_) => "generation_failed",
            Error::Configuration(_) => "configuration_error",
            Error::InvalidInput(_) => "invalid_input",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Timeout(_) => "timeout",
            Error::Io(_) => "io_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
