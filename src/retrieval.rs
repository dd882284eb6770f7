//! Query-time retrieval: widened candidate search plus MMR re-ranking.
//!
//! The question is embedded, a candidate pool larger than `top_k` is pulled
//! from the index, and Maximal Marginal Relevance picks the final set,
//! trading relevance against diversity so near-duplicate chunks don't crowd
//! out coverage. Candidate vectors come straight from the index.

use crate::config::{RetrievalConfig, CANDIDATE_MULTIPLIER, MIN_CANDIDATE_POOL};
use crate::error::AppError;
use crate::index::{dot, VectorIndex};
use crate::llm::LlmClient;

/// One retrieved chunk with its similarity to the query.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub page: u32,
    pub score: f32,
}

/// Retrieve the `top_k` most relevant, diverse chunks for a question.
pub async fn retrieve(
    index: &VectorIndex,
    llm: &LlmClient,
    config: &RetrievalConfig,
    question: &str,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let query = llm.embed(question).await?;

    let pool = (config.top_k * CANDIDATE_MULTIPLIER).max(MIN_CANDIDATE_POOL);
    let candidates = index.search(&query, pool)?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let vectors: Vec<&[f32]> = candidates.iter().map(|&(row, _)| index.vector(row)).collect();
    let sims: Vec<f32> = candidates.iter().map(|&(_, score)| score).collect();
    let selected = mmr_select(&vectors, &sims, config.top_k, config.mmr_lambda);

    Ok(selected
        .into_iter()
        .map(|j| {
            let (row, score) = candidates[j];
            let meta = index.meta(row);
            RetrievedChunk {
                text: meta.text.clone(),
                source: meta.source.clone(),
                page: meta.page,
                score,
            }
        })
        .collect())
}

/// Maximal Marginal Relevance over normalized candidate vectors.
///
/// Seeds with the most query-similar candidate, then greedily adds the
/// candidate maximizing `lambda * relevance - (1 - lambda) * diversity`,
/// where diversity is the maximum similarity to anything already selected.
/// Returns indices into the candidate arrays, selection order preserved.
pub fn mmr_select(
    vectors: &[&[f32]],
    sims_to_query: &[f32],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    debug_assert_eq!(vectors.len(), sims_to_query.len());
    if vectors.is_empty() || k == 0 {
        return Vec::new();
    }

    let n = vectors.len();
    let mut selected = Vec::with_capacity(k.min(n));
    let mut picked = vec![false; n];

    // Seed with the most relevant candidate; ties keep the earliest, which
    // is also the best-scored row from the index search.
    let mut seed = 0;
    for i in 1..n {
        if sims_to_query[i] > sims_to_query[seed] {
            seed = i;
        }
    }
    selected.push(seed);
    picked[seed] = true;

    while selected.len() < k.min(n) {
        let mut best_idx = None;
        let mut best_score = f32::NEG_INFINITY;
        for i in 0..n {
            if picked[i] {
                continue;
            }
            let relevance = sims_to_query[i];
            let diversity = selected
                .iter()
                .map(|&j| dot(vectors[i], vectors[j]))
                .fold(f32::NEG_INFINITY, f32::max);
            let score = lambda * relevance - (1.0 - lambda) * diversity;
            if score > best_score {
                best_score = score;
                best_idx = Some(i);
            }
        }
        match best_idx {
            Some(i) => {
                selected.push(i);
                picked[i] = true;
            }
            None => break,
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmr_seeds_with_most_relevant() {
        let a: &[f32] = &[1.0, 0.0];
        let b: &[f32] = &[0.0, 1.0];
        let selected = mmr_select(&[a, b], &[0.4, 0.9], 1, 0.7);
        assert_eq!(selected, vec![1]);
    }

    #[test]
    fn test_mmr_penalizes_duplicates() {
        // Two identical top candidates and one distinct runner-up: the
        // duplicate should lose its slot to the diverse candidate.
        let top: &[f32] = &[1.0, 0.0];
        let dup: &[f32] = &[1.0, 0.0];
        let other: &[f32] = &[0.0, 1.0];
        let selected = mmr_select(&[top, dup, other], &[0.9, 0.9, 0.6], 2, 0.5);
        assert_eq!(selected[0], 0);
        assert_eq!(selected[1], 2);
    }

    #[test]
    fn test_mmr_caps_at_candidate_count() {
        let a: &[f32] = &[1.0, 0.0];
        let b: &[f32] = &[0.0, 1.0];
        let selected = mmr_select(&[a, b], &[0.9, 0.8], 5, 0.7);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_mmr_empty_input() {
        assert!(mmr_select(&[], &[], 3, 0.7).is_empty());
    }

    #[test]
    fn test_mmr_pure_relevance_when_lambda_is_one() {
        let a: &[f32] = &[1.0, 0.0];
        let b: &[f32] = &[1.0, 0.0];
        let c: &[f32] = &[0.0, 1.0];
        let selected = mmr_select(&[a, b, c], &[0.9, 0.8, 0.1], 2, 1.0);
        assert_eq!(selected, vec![0, 1]);
    }
}
