//! Deterministic feature-hash embedder.
//!
//! Each lexical subtoken is mapped to a fixed vector derived from its
//! blake3 digest, L2-normalized. Identical tokens always produce identical
//! vectors, so MaxSim over these matrices behaves like soft lexical
//! matching with identifier splitting. No model files, no network, fully
//! reproducible. The test suite runs against this backend.

use anyhow::Result;
use ndarray::Array2;

use super::{EmbedMode, Embedder};
use crate::lexical;

pub const TOKEN_DIM: usize = 64;
const DOC_MAX_TOKENS: usize = 512;
const QUERY_MAX_TOKENS: usize = 64;

pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a unit vector from a token. blake3's extendable output fills the
/// full dimension regardless of `TOKEN_DIM`.
fn token_vector(token: &str) -> Vec<f32> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(token.as_bytes());
    let mut reader = hasher.finalize_xof();

    let mut bytes = vec![0u8; TOKEN_DIM * 4];
    reader.fill(&mut bytes);

    let mut v: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| {
            let raw = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            (raw as f32 / u32::MAX as f32) - 0.5
        })
        .collect();

    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn embed_one(text: &str, max_tokens: usize) -> Array2<f32> {
    let mut tokens: Vec<String> = lexical::subtokens(text)
        .into_iter()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() {
        // Keep the matrix non-empty so MaxSim stays defined.
        tokens.push("<empty>".to_string());
    }
    tokens.truncate(max_tokens);

    let mut matrix = Array2::zeros((tokens.len(), TOKEN_DIM));
    for (i, token) in tokens.iter().enumerate() {
        let v = token_vector(token);
        for (j, x) in v.iter().enumerate() {
            matrix[[i, j]] = *x;
        }
    }
    matrix
}

impl Embedder for HashingEmbedder {
    fn embed(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Array2<f32>>> {
        let max_tokens = match mode {
            EmbedMode::Document => DOC_MAX_TOKENS,
            EmbedMode::Query => QUERY_MAX_TOKENS,
        };
        Ok(texts.iter().map(|t| embed_one(t, max_tokens)).collect())
    }

    fn identity(&self) -> String {
        format!("hashing:f32:{TOKEN_DIM}")
    }

    fn token_dim(&self) -> usize {
        TOKEN_DIM
    }
}
