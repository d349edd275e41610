//! Late-interaction scoring primitives.
//!
//! MaxSim: for each query token, the maximum dot product against any
//! document token, summed over query tokens. Token vectors are
//! L2-normalized by the embedder, so dot products are cosines and the raw
//! score lies in `[-q, q]` for `q` query tokens; callers normalize by `q`.
//!
//! The FDE (fixed-dimensional encoding) of a token matrix is its mean
//! vector, re-normalized. It summarizes the matrix in one vector so large
//! collections can be shortlisted with a cheap cosine scan before the
//! exact MaxSim rerank.

/// Raw MaxSim score between a query and a document token matrix.
pub fn maxsim(query: &[Vec<f32>], doc: &[Vec<f32>]) -> f32 {
    if query.is_empty() || doc.is_empty() {
        return 0.0;
    }

    let mut total = 0.0f32;
    for q in query {
        let mut best = f32::NEG_INFINITY;
        for d in doc {
            let s = dot(q, d);
            if s > best {
                best = s;
            }
        }
        total += best;
    }
    total
}

/// MaxSim normalized by query token count, giving a score in roughly
/// `[0, 1]` for non-adversarial inputs.
pub fn maxsim_normalized(query: &[Vec<f32>], doc: &[Vec<f32>]) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    maxsim(query, doc) / query.len() as f32
}

/// Mean-pool a token matrix into a single unit vector.
pub fn fde(tokens: &[Vec<f32>], dim: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; dim];
    if tokens.is_empty() {
        return sum;
    }
    for t in tokens {
        for (i, x) in t.iter().take(dim).enumerate() {
            sum[i] += x;
        }
    }
    let n = tokens.len() as f32;
    for x in &mut sum {
        *x /= n;
    }
    let norm: f32 = sum.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for x in &mut sum {
            *x /= norm;
        }
    }
    sum
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale scores into `[0, 1]` by the maximum. Empty and all-zero inputs
/// are left untouched.
pub fn normalize_scores(scores: &mut [f32]) {
    let max = scores.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        for s in scores {
            *s /= max;
        }
    }
}
