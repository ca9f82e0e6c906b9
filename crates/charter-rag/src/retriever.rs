//! Query-time retrieval across the question and its reformulations

use futures::future::join_all;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use charter_core::{
    ChunkId, Embedder, Error, Result, RetrievedPassage, ScoredEntry, VectorIndex,
};

use crate::expander::QueryExpander;

/// One retrieval call
#[derive(Debug, Clone, Copy)]
pub struct RetrievalRequest<'a> {
    pub question: &'a str,
    /// Passages wanted, also the per-query search depth
    pub k: usize,
    pub expand: bool,
    pub diversify: bool,
}

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    expander: Option<Arc<QueryExpander>>,
    min_relevance: Option<f32>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            expander: None,
            min_relevance: None,
        }
    }

    pub fn with_expander(mut self, expander: Arc<QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Drop passages scoring below `threshold`
    pub fn with_min_relevance(mut self, threshold: Option<f32>) -> Self {
        self.min_relevance = threshold;
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Ranked, deduplicated passages for `request`.
    ///
    /// The original question must be embedded and searched successfully;
    /// a failing reformulation is logged and skipped.
    pub async fn retrieve(&self, request: RetrievalRequest<'_>) -> Result<Vec<RetrievedPassage>> {
        if request.k == 0 {
            return Ok(Vec::new());
        }

        let queries = match (&self.expander, request.expand) {
            (Some(expander), true) => expander.expand(request.question).await,
            _ => vec![request.question.to_string()],
        };

        let searches = queries
            .iter()
            .map(|q| self.search_one(q, request.k, request.diversify));
        let mut results = join_all(searches).await.into_iter();

        let original = match results.next() {
            Some(result) => result?,
            None => Vec::new(),
        };

        let mut per_query = vec![original];
        for (query, result) in queries.iter().skip(1).zip(results) {
            match result {
                Ok(hits) => per_query.push(hits),
                Err(e) => warn!(query = %query, error = %e, "skipping failed reformulation"),
            }
        }

        let mut passages = merge(per_query);
        if let Some(threshold) = self.min_relevance {
            passages.retain(|p| p.score >= threshold);
        }
        passages.truncate(request.k);

        debug!(
            queries = queries.len(),
            passages = passages.len(),
            k = request.k,
            "retrieved passages"
        );
        Ok(passages)
    }

    async fn search_one(&self, query: &str, k: usize, diversify: bool) -> Result<Vec<ScoredEntry>> {
        let vector = self.embedder.embed(query).await.map_err(|e| match e {
            Error::Embedding(_) => e,
            other => Error::Embedding(other.to_string()),
        })?;

        self.index
            .search(&vector, k, diversify)
            .await
            .map_err(|e| match e {
                Error::Retrieval(_) => e,
                other => Error::Retrieval(other.to_string()),
            })
    }
}

/// Merge per-query hits (original question first) by chunk id, keeping the
/// best score. Order: score desc, then the original question's own score
/// (unmatched last), then first-seen order.
pub fn merge(per_query: Vec<Vec<ScoredEntry>>) -> Vec<RetrievedPassage> {
    let mut passages: Vec<RetrievedPassage> = Vec::new();
    let mut positions: HashMap<ChunkId, usize> = HashMap::new();

    for (query_index, hits) in per_query.into_iter().enumerate() {
        for hit in hits {
            let original_score = (query_index == 0).then_some(hit.score);
            match positions.get(&hit.chunk.id) {
                Some(&pos) => {
                    let passage = &mut passages[pos];
                    passage.score = passage.score.max(hit.score);
                    if passage.original_score.is_none() {
                        passage.original_score = original_score;
                    }
                }
                None => {
                    positions.insert(hit.chunk.id.clone(), passages.len());
                    passages.push(RetrievedPassage {
                        chunk: hit.chunk,
                        score: hit.score,
                        original_score,
                    });
                }
            }
        }
    }

    passages.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| match (a.original_score, b.original_score) {
                (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });
    passages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_index::{LocalVectorIndex, StoredEntry};
    use crate::HashEmbedder;
    use async_trait::async_trait;
    use charter_core::{Chunk, GenerationConfig, IndexManifest, MockLlm};
    use serde_json::json;
    use std::collections::HashSet;

    fn chunk(position: usize, text: &str) -> Chunk {
        Chunk {
            id: ChunkId::new("Page-1", position),
            text: text.to_string(),
            start: 0,
            end: text.len(),
            overlap: 0,
            metadata: json!({"source": format!("Page-{}", position + 1)}),
        }
    }

    fn hit(position: usize, score: f32) -> ScoredEntry {
        ScoredEntry {
            chunk: chunk(position, &format!("chunk {}", position)),
            score,
        }
    }

    const ARTICLES: [&str; 5] = [
        "All citizens are equal before law and are entitled to equal protection of law.",
        "There shall be no discrimination on the basis of sex.",
        "Every citizen shall have the right to freedom of speech and expression.",
        "The President shall be elected by an electoral college.",
        "No person shall be deprived of life or liberty save in accordance with law.",
    ];

    fn hashed_index(embedder: &HashEmbedder) -> Arc<dyn VectorIndex> {
        let entries = ARTICLES
            .iter()
            .enumerate()
            .map(|(i, text)| StoredEntry {
                chunk: chunk(i, text),
                vector: embedder.embed_text(text),
            })
            .collect();
        Arc::new(LocalVectorIndex::from_entries(entries, None))
    }

    /// Maps known texts to one-hot vectors and fails on anything containing "FAIL"
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn model_id(&self) -> &str {
            "table"
        }
        fn dimensions(&self) -> usize {
            3
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("FAIL") {
                return Err(Error::Network("embedding service down".to_string()));
            }
            Ok(self
                .table
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
        }
    }

    /// Returns canned hits keyed by which axis the query vector points along
    struct ScriptedIndex {
        by_axis: Vec<Vec<ScoredEntry>>,
    }

    #[async_trait]
    impl VectorIndex for ScriptedIndex {
        async fn search(&self, query: &[f32], k: usize, _diversify: bool) -> Result<Vec<ScoredEntry>> {
            let axis = query.iter().position(|v| *v > 0.5).unwrap_or(0);
            Ok(self.by_axis[axis].iter().take(k).cloned().collect())
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.by_axis.iter().map(Vec::len).sum())
        }
        fn manifest(&self) -> Option<&IndexManifest> {
            None
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl VectorIndex for FailingIndex {
        async fn search(&self, _q: &[f32], _k: usize, _d: bool) -> Result<Vec<ScoredEntry>> {
            Err(Error::Io(std::io::Error::other("disk gone")))
        }
        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
        fn manifest(&self) -> Option<&IndexManifest> {
            None
        }
    }

    fn table_embedder() -> Arc<TableEmbedder> {
        let table = HashMap::from([
            ("original".to_string(), vec![1.0, 0.0, 0.0]),
            ("rephrased".to_string(), vec![0.0, 1.0, 0.0]),
        ]);
        Arc::new(TableEmbedder { table })
    }

    fn expander(llm: MockLlm) -> Arc<QueryExpander> {
        Arc::new(QueryExpander::new(Arc::new(llm), GenerationConfig::default()))
    }

    fn request(question: &str, k: usize, expand: bool) -> RetrievalRequest<'_> {
        RetrievalRequest {
            question,
            k,
            expand,
            diversify: false,
        }
    }

    #[tokio::test]
    async fn test_exact_text_ranks_first() {
        let embedder = Arc::new(HashEmbedder::default());
        let retriever = Retriever::new(hashed_index(&embedder), embedder.clone());

        for (i, text) in ARTICLES.iter().enumerate() {
            let passages = retriever.retrieve(request(text, 4, false)).await.unwrap();
            assert_eq!(passages[0].chunk.id.position, i);
            assert!((passages[0].score - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_results_deduplicated_across_reformulations() {
        let embedder = Arc::new(HashEmbedder::default());
        let llm = MockLlm::with_responses(vec![format!(
            "{}\nright to life and liberty under law\nequal protection of law for citizens",
            ARTICLES[0]
        )]);
        let retriever = Retriever::new(hashed_index(&embedder), embedder.clone())
            .with_expander(expander(llm));

        let passages = retriever
            .retrieve(request("Are citizens equal before law?", 4, true))
            .await
            .unwrap();

        assert!(passages.len() <= 4);
        let ids: HashSet<&ChunkId> = passages.iter().map(|p| &p.chunk.id).collect();
        assert_eq!(ids.len(), passages.len());
        assert_eq!(passages[0].chunk.id.position, 0);
    }

    #[tokio::test]
    async fn test_expander_failure_matches_plain_retrieval() {
        let embedder = Arc::new(HashEmbedder::default());
        let plain = Retriever::new(hashed_index(&embedder), embedder.clone());
        let degraded = Retriever::new(hashed_index(&embedder), embedder.clone())
            .with_expander(expander(MockLlm::failing()));

        let question = "freedom of speech";
        let a = plain.retrieve(request(question, 4, false)).await.unwrap();
        let b = degraded.retrieve(request(question, 4, true)).await.unwrap();

        let ids = |ps: &[RetrievedPassage]| ps.iter().map(|p| p.chunk.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[tokio::test]
    async fn test_max_score_kept_and_original_breaks_ties() {
        let index = ScriptedIndex {
            by_axis: vec![
                // original question
                vec![hit(1, 0.8), hit(2, 0.5)],
                // reformulation
                vec![hit(3, 0.8), hit(2, 0.9)],
                vec![],
            ],
        };
        let llm = MockLlm::with_responses(vec!["rephrased".to_string()]);
        let retriever = Retriever::new(Arc::new(index), table_embedder()).with_expander(expander(llm));

        let passages = retriever.retrieve(request("original", 10, true)).await.unwrap();
        let order: Vec<usize> = passages.iter().map(|p| p.chunk.id.position).collect();

        assert_eq!(order, vec![2, 1, 3]);
        assert!((passages[0].score - 0.9).abs() < 1e-6);
        assert_eq!(passages[0].original_score, Some(0.5));
        assert_eq!(passages[2].original_score, None);
    }

    #[tokio::test]
    async fn test_truncates_to_k() {
        let index = ScriptedIndex {
            by_axis: vec![
                vec![hit(1, 0.9), hit(2, 0.8)],
                vec![hit(3, 0.7), hit(4, 0.6)],
                vec![],
            ],
        };
        let llm = MockLlm::with_responses(vec!["rephrased".to_string()]);
        let retriever = Retriever::new(Arc::new(index), table_embedder()).with_expander(expander(llm));

        let passages = retriever.retrieve(request("original", 2, true)).await.unwrap();
        let order: Vec<usize> = passages.iter().map(|p| p.chunk.id.position).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_reformulation_is_skipped() {
        let index = ScriptedIndex {
            by_axis: vec![vec![hit(1, 0.9)], vec![], vec![]],
        };
        let llm = MockLlm::with_responses(vec!["FAIL here".to_string()]);
        let retriever = Retriever::new(Arc::new(index), table_embedder()).with_expander(expander(llm));

        let passages = retriever.retrieve(request("original", 4, true)).await.unwrap();
        assert_eq!(passages.len(), 1);
    }

    #[tokio::test]
    async fn test_original_embedding_failure_propagates() {
        let index = ScriptedIndex {
            by_axis: vec![vec![], vec![], vec![]],
        };
        let retriever = Retriever::new(Arc::new(index), table_embedder());
        let result = retriever.retrieve(request("FAIL original", 4, false)).await;
        assert!(matches!(result, Err(Error::Embedding(_))));
    }

    #[tokio::test]
    async fn test_index_failure_is_retrieval_error() {
        let retriever = Retriever::new(Arc::new(FailingIndex), table_embedder());
        let result = retriever.retrieve(request("original", 4, false)).await;
        assert!(matches!(result, Err(Error::Retrieval(_))));
    }

    #[tokio::test]
    async fn test_min_relevance_filters() {
        let index = ScriptedIndex {
            by_axis: vec![vec![hit(1, 0.9), hit(2, 0.2)], vec![], vec![]],
        };
        let retriever =
            Retriever::new(Arc::new(index), table_embedder()).with_min_relevance(Some(0.5));
        let passages = retriever.retrieve(request("original", 4, false)).await.unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].chunk.id.position, 1);
    }

    #[tokio::test]
    async fn test_empty_index_gives_no_passages() {
        let embedder = Arc::new(HashEmbedder::default());
        let retriever = Retriever::new(Arc::new(LocalVectorIndex::empty()), embedder);
        assert!(retriever.retrieve(request("anything", 4, false)).await.unwrap().is_empty());
    }
}
