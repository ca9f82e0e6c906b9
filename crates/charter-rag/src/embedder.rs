//! Local feature-hashing embedder

use async_trait::async_trait;

use charter_core::{Embedder, Error, Result};

const BIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic bag-of-words embedder that needs no network.
///
/// Unigrams and bigrams of the lower-cased alphanumeric tokens are hashed
/// with md5 into `dimensions` signed buckets and the vector is L2
/// normalized. The md5 digest keeps vectors stable across processes and
/// platforms, which is what lets an index built by `ingest` be searched by
/// a later `serve`.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashEmbedder {
    pub const DEFAULT_DIMENSIONS: usize = 384;

    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Configuration(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            model_id: format!("charter-hash-v1-{}", dimensions),
        })
    }

    /// Embed synchronously; the async trait methods delegate here
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dimensions];

        for token in &tokens {
            self.add_feature(&mut vector, "u", token, 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, "b", &bigram, BIGRAM_WEIGHT);
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], kind: &str, feature: &str, weight: f32) {
        let digest = md5::compute(format!("{}:{}", kind, feature));
        let bytes = digest.0;

        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

        vector[bucket] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: Self::DEFAULT_DIMENSIONS,
            model_id: format!("charter-hash-v1-{}", Self::DEFAULT_DIMENSIONS),
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
