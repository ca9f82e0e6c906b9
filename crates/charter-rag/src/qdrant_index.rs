//! Qdrant-backed vector index

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, ListValue, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use charter_core::{
    Chunk, Error, IndexBackend, IndexManifest, IndexWriter, Result, ScoredEntry, VectorIndex,
};

use crate::mmr::{MmrConfig, mmr_select};
use crate::storage::{BuildInfo, read_manifest, write_manifest};

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

const UPSERT_BATCH: usize = 64;

/// Qdrant point id for a chunk; stable across runs
pub fn point_id(chunk: &Chunk) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk.id.to_string().as_bytes()).to_string()
}

/// Collection an ingestion of `fingerprint` writes into
pub fn collection_name(base: &str, fingerprint: &str) -> String {
    let prefix: String = fingerprint.chars().take(12).collect();
    format!("{}_{}", base, prefix)
}

fn connect(url: &str) -> Result<Qdrant> {
    Qdrant::from_url(url)
        .build()
        .map_err(|e| Error::Configuration(format!("invalid Qdrant URL {}: {}", url, e)))
}

/// Payload stored with every point. The vector is mirrored in the payload so
/// search results can be diversified client side.
pub(crate) fn chunk_payload(chunk: &Chunk, vector: &[f32]) -> Result<HashMap<String, Value>> {
    let mut payload = HashMap::new();
    payload.insert("chunk".to_string(), Value::from(serde_json::to_string(chunk)?));
    payload.insert("text".to_string(), Value::from(chunk.text.clone()));
    payload.insert(
        "document_id".to_string(),
        Value::from(chunk.id.document_id.clone()),
    );
    payload.insert(
        "embedding".to_string(),
        Value {
            kind: Some(Kind::ListValue(ListValue {
                values: vector
                    .iter()
                    .map(|v| Value {
                        kind: Some(Kind::DoubleValue(f64::from(*v))),
                    })
                    .collect(),
            })),
        },
    );
    Ok(payload)
}

pub(crate) fn entry_from_payload(payload: &HashMap<String, Value>) -> Result<(Chunk, Vec<f32>)> {
    let chunk = match payload.get("chunk").and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(raw)) => serde_json::from_str::<Chunk>(raw)
            .map_err(|e| Error::Retrieval(format!("corrupt chunk payload: {}", e)))?,
        _ => {
            return Err(Error::Retrieval(
                "point is missing its chunk payload".to_string(),
            ));
        }
    };

    let vector = match payload.get("embedding").and_then(|v| v.kind.as_ref()) {
        Some(Kind::ListValue(list)) => list
            .values
            .iter()
            .map(|v| match &v.kind {
                Some(Kind::DoubleValue(d)) => Ok(*d as f32),
                Some(Kind::IntegerValue(i)) => Ok(*i as f32),
                _ => Err(Error::Retrieval(
                    "non-numeric value in embedding payload".to_string(),
                )),
            })
            .collect::<Result<Vec<f32>>>()?,
        _ => Vec::new(),
    };

    Ok((chunk, vector))
}

/// Read side over a committed Qdrant collection
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
    manifest: IndexManifest,
    mmr: MmrConfig,
}

impl QdrantVectorIndex {
    pub fn connect(url: &str, collection: &str, manifest: IndexManifest) -> Result<Self> {
        Ok(Self {
            client: connect(url)?,
            collection: collection.to_string(),
            manifest,
            mmr: MmrConfig::default(),
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn search(&self, query: &[f32], k: usize, diversify: bool) -> Result<Vec<ScoredEntry>> {
        if k == 0 || self.manifest.chunk_count == 0 {
            return Ok(Vec::new());
        }

        let limit = if diversify {
            self.mmr.candidates_for(k)
        } else {
            k
        };

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(self.collection.as_str(), query.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| Error::Retrieval(format!("Qdrant search failed: {}", e)))?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let (chunk, vector) = entry_from_payload(&point.payload)?;
            hits.push((ScoredEntry { chunk, score: point.score }, vector));
        }

        debug!(collection = %self.collection, k, diversify, hits = hits.len(), "qdrant search");

        if !diversify {
            return Ok(hits.into_iter().map(|(entry, _)| entry).take(k).collect());
        }

        let vectors: Vec<&[f32]> = hits.iter().map(|(_, v)| v.as_slice()).collect();
        let order = mmr_select(query, &vectors, k, self.mmr.lambda);
        Ok(order.into_iter().map(|i| hits[i].0.clone()).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.manifest.chunk_count)
    }

    fn manifest(&self) -> Option<&IndexManifest> {
        Some(&self.manifest)
    }
}

/// Upserts into a fresh collection; the local manifest switches over to it
/// only once every point is stored
pub struct QdrantIndexWriter {
    client: Qdrant,
    url: String,
    collection: String,
    dir: PathBuf,
    info: BuildInfo,
    pending: Vec<PointStruct>,
    written: usize,
    created: bool,
}

impl QdrantIndexWriter {
    pub fn new(
        url: &str,
        base_collection: &str,
        dir: impl Into<PathBuf>,
        info: BuildInfo,
    ) -> Result<Self> {
        let dir = dir.into();
        let mut collection = collection_name(base_collection, &info.fingerprint);

        // a forced rebuild must not overwrite the collection still being served
        if let Some(IndexManifest {
            backend: IndexBackend::Qdrant { collection: live, .. },
            ..
        }) = read_manifest(&dir).ok().flatten()
        {
            if live == collection {
                let nonce = Uuid::new_v4().simple().to_string();
                collection = format!("{}_{}", collection, &nonce[..8]);
            }
        }

        Ok(Self {
            client: connect(url)?,
            url: url.to_string(),
            collection,
            dir,
            info,
            pending: Vec::new(),
            written: 0,
            created: false,
        })
    }

    /// Start from an empty collection, dropping leftovers of an earlier run
    async fn ensure_fresh_collection(&mut self) -> Result<()> {
        if self.created {
            return Ok(());
        }

        let exists = self
            .client
            .collection_exists(self.collection.as_str())
            .await
            .map_err(|e| Error::Ingestion(format!("Qdrant unreachable: {}", e)))?;
        if exists {
            self.client
                .delete_collection(self.collection.as_str())
                .await
                .map_err(|e| Error::Ingestion(format!("cannot reset {}: {}", self.collection, e)))?;
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(self.collection.as_str()).vectors_config(
                    VectorParamsBuilder::new(self.info.dimensions as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| Error::Ingestion(format!("cannot create {}: {}", self.collection, e)))?;

        info!(collection = %self.collection, "created qdrant collection");
        self.created = true;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let points = std::mem::take(&mut self.pending);
        let count = points.len();

        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.as_str(), points).wait(true))
            .await
            .map_err(|e| Error::Ingestion(format!("Qdrant upsert failed: {}", e)))?;

        self.written += count;
        debug!(collection = %self.collection, count, "upserted points");
        Ok(())
    }
}

#[async_trait]
impl IndexWriter for QdrantIndexWriter {
    async fn insert(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.info.dimensions {
            return Err(Error::Ingestion(format!(
                "chunk {} has a {}-dimensional vector, expected {}",
                chunk.id,
                vector.len(),
                self.info.dimensions
            )));
        }

        self.ensure_fresh_collection().await?;

        let payload = chunk_payload(&chunk, &vector)?;
        self.pending
            .push(PointStruct::new(point_id(&chunk), vector, payload));

        if self.pending.len() >= UPSERT_BATCH {
            self.flush().await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<IndexManifest> {
        self.ensure_fresh_collection().await?;
        self.flush().await?;

        let previous = read_manifest(&self.dir).ok().flatten();

        let manifest = self.info.manifest(
            self.written,
            IndexBackend::Qdrant {
                url: self.url.clone(),
                collection: self.collection.clone(),
            },
        );
        write_manifest(&self.dir, &manifest)?;

        if let Some(IndexManifest {
            backend: IndexBackend::Qdrant { collection, .. },
            ..
        }) = previous
        {
            if collection != self.collection {
                if let Err(e) = self.client.delete_collection(collection.as_str()).await {
                    warn!(collection = %collection, error = %e, "could not drop superseded collection");
                }
            }
        }

        info!(collection = %self.collection, points = self.written, "committed qdrant index");
        Ok(manifest)
    }

    async fn abort(&mut self) {
        self.pending.clear();
        if self.created {
            if let Err(e) = self.client.delete_collection(self.collection.as_str()).await {
                warn!(collection = %self.collection, error = %e, "could not drop staging collection");
            }
        }
    }
}
