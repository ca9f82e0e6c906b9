//! Gemini embedding client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use charter_core::{Embedder, Error, Result};

use crate::config::GeminiConfig;
use crate::http::post_json;

/// `batchEmbedContents` accepts at most this many requests per call
const MAX_BATCH: usize = 100;

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Embeds text with a Gemini embedding model (`text-embedding-004` by default)
pub struct GeminiEmbedder {
    config: GeminiConfig,
    client: Client,
    dimensions: usize,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EmbedContentRequest {
    model: String,
    content: EmbedContent,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

impl EmbedContentRequest {
    pub(crate) fn new(model: &str, text: &str, task_type: &'static str) -> Self {
        Self {
            model: format!("models/{}", model),
            content: EmbedContent {
                parts: vec![TextPart {
                    text: text.to_string(),
                }],
            },
            task_type,
        }
    }
}

impl GeminiEmbedder {
    pub const TEXT_EMBEDDING_004_DIMENSIONS: usize = 768;

    pub fn new(config: GeminiConfig) -> Result<Self> {
        let timeout = EMBED_TIMEOUT.min(config.timeout);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            client,
            dimensions: Self::TEXT_EMBEDDING_004_DIMENSIONS,
            timeout,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    /// Override the expected vector length for models other than text-embedding-004
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.api_url, self.config.embedding_model, method
        )
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::Embedding(format!(
                "expected {} dimensions from {}, got {}",
                self.dimensions,
                self.config.embedding_model,
                vector.len()
            )));
        }
        Ok(())
    }

    async fn embed_one_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| {
                    EmbedContentRequest::new(&self.config.embedding_model, t, "RETRIEVAL_DOCUMENT")
                })
                .collect(),
        };

        let response: BatchEmbedResponse = post_json(
            &self.client,
            &self.endpoint("batchEmbedContents"),
            &self.config.api_key,
            &request,
            self.timeout,
            Error::Embedding,
        )
        .await
        .map_err(into_embedding_error)?;

        if response.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "asked for {} embeddings, Gemini returned {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for embedding in response.embeddings {
            self.check_dimensions(&embedding.values)?;
            vectors.push(embedding.values);
        }
        Ok(vectors)
    }
}

fn into_embedding_error(err: Error) -> Error {
    match err {
        Error::Embedding(_) => err,
        other => Error::Embedding(other.to_string()),
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_id(&self) -> &str {
        &self.config.embedding_model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request =
            EmbedContentRequest::new(&self.config.embedding_model, text, "RETRIEVAL_QUERY");

        let response: EmbedContentResponse = post_json(
            &self.client,
            &self.endpoint("embedContent"),
            &self.config.api_key,
            &request,
            self.timeout,
            Error::Embedding,
        )
        .await
        .map_err(into_embedding_error)?;

        self.check_dimensions(&response.embedding.values)?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            debug!(size = batch.len(), "embedding batch with Gemini");
            vectors.extend(self.embed_one_batch(batch).await?);
        }
        Ok(vectors)
    }
}
