//! Maximal Marginal Relevance re-ranking.
//!
//! MMR = λ × similarity(query, doc) - (1-λ) × max(similarity(doc, selected))
//!
//! λ = 1.0 keeps pure relevance order, λ = 0.0 maximizes diversity.

/// Cosine similarity clamped to `[-1, 1]`. Zero-magnitude input scores 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norms(a, b, magnitude(a), magnitude(b))
}

pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine_with_norms(a: &[f32], b: &[f32], norm_a: f32, norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// A search candidate with its precomputed relevance to the query.
#[derive(Debug, Clone, Copy)]
pub struct MmrCandidate<'a> {
    /// Position of the entry in the index.
    pub position: usize,
    pub relevance: f32,
    pub vector: &'a [f32],
}

/// Pick up to `k` candidates, trading relevance against redundancy.
///
/// Candidates are expected in descending relevance order. Ties keep the
/// earlier candidate, so the result is deterministic for a fixed input.
/// Returns index positions in selection order.
pub fn mmr_select(candidates: &[MmrCandidate<'_>], k: usize, lambda: f32) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }
    let lambda = lambda.clamp(0.0, 1.0);

    let norms: Vec<f32> = candidates.iter().map(|c| magnitude(c.vector)).collect();
    // max similarity of each candidate to anything selected so far
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut taken = vec![false; candidates.len()];
    let mut selected = Vec::with_capacity(k);

    for _ in 0..k {
        let mut best: Option<(usize, f32)> = None;
        for (idx, candidate) in candidates.iter().enumerate() {
            if taken[idx] {
                continue;
            }
            let max_sim = if selected.is_empty() { 0.0 } else { redundancy[idx] };
            let score = lambda * candidate.relevance - (1.0 - lambda) * max_sim;
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((idx, score));
            }
        }

        let Some((chosen, _)) = best else { break };
        taken[chosen] = true;
        selected.push(chosen);

        for (idx, candidate) in candidates.iter().enumerate() {
            if taken[idx] {
                continue;
            }
            let sim = cosine_with_norms(candidate.vector, candidates[chosen].vector, norms[idx], norms[chosen]);
            redundancy[idx] = redundancy[idx].max(sim);
        }
    }

    selected.into_iter().map(|idx| candidates[idx].position).collect()
}
