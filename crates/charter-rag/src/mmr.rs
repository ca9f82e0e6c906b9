//! Maximal marginal relevance reranking
//!
//! MMR picks results one at a time, maximizing
//! `λ × sim(query, doc) - (1 - λ) × max(sim(doc, already_selected))`.
//! λ = 1.0 is plain relevance order, λ = 0.0 is pure diversity.

use charter_core::cosine_similarity;

/// Diversification settings used by the vector indexes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmrConfig {
    pub lambda: f32,
    /// Nearest candidates fetched before reranking
    pub fetch_k: usize,
}

impl Default for MmrConfig {
    fn default() -> Self {
        Self {
            lambda: 0.5,
            fetch_k: 20,
        }
    }
}

impl MmrConfig {
    /// Custom lambda (clamped to 0.0-1.0)
    pub fn with_lambda(lambda: f32) -> Self {
        Self {
            lambda: lambda.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    /// Candidates to fetch for a request of `k`
    pub fn candidates_for(&self, k: usize) -> usize {
        self.fetch_k.max(k)
    }
}

/// Rerank `candidates` (vectors, ideally sorted by relevance desc) and return
/// the indices of up to `k` selected candidates in selection order.
///
/// Ties keep the earlier candidate, so equal inputs always give equal output.
pub fn mmr_select(query: &[f32], candidates: &[&[f32]], k: usize, lambda: f32) -> Vec<usize> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let k = k.min(candidates.len());
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k);
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(candidates[idx], candidates[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let score = lambda * relevance[idx] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}
