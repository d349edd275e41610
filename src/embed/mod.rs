//! Embedding backends.
//!
//! The engine treats the embedder as a black box turning a batch of strings
//! into one matrix of per-token vectors per string. Two backends exist: the
//! ONNX model runtime (feature `onnx`) and a deterministic feature-hash
//! fallback that needs no model files.

pub mod hashing;
#[cfg(feature = "onnx")]
pub mod onnx;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use anyhow::Result;
use ndarray::Array2;

use crate::config::{Config, EmbedderBackend};

/// Which side of the retrieval pair is being embedded. Backends may use
/// different truncation lengths (documents are typically longer) or
/// mode-specific prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    Document,
    Query,
}

/// A multi-vector embedding backend. Each input string produces a
/// `(token_count, token_dim)` matrix.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Array2<f32>>>;

    /// `"<model_name>:<precision>:<dim>"`, recorded in the manifest. An
    /// index is only readable by the embedder that produced it.
    fn identity(&self) -> String;

    fn token_dim(&self) -> usize;
}

/// Instantiate the configured backend.
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedder {
        EmbedderBackend::Hashing => Ok(Arc::new(hashing::HashingEmbedder::new())),
        #[cfg(feature = "onnx")]
        EmbedderBackend::Onnx => Ok(Arc::new(onnx::OnnxEmbedder::from_env()?)),
        #[cfg(not(feature = "onnx"))]
        EmbedderBackend::Onnx => {
            anyhow::bail!("onnx backend requested but this build lacks the 'onnx' feature")
        }
    }
}

/// Process-wide query embedding cache. Queries repeat across searches in
/// one session; documents do not, so only the query side is cached.
static QUERY_CACHE: LazyLock<Mutex<HashMap<String, Array2<f32>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Embed one query string, consulting the process-wide cache.
pub fn embed_query_cached(embedder: &dyn Embedder, text: &str) -> Result<Array2<f32>> {
    let key = format!("{}\u{0}{}", embedder.identity(), text);

    if let Some(hit) = QUERY_CACHE.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
        return Ok(hit.clone());
    }

    let mut result = embedder.embed(&[text], EmbedMode::Query)?;
    let matrix = result
        .pop()
        .ok_or_else(|| anyhow::anyhow!("embedder returned no matrix for query"))?;

    QUERY_CACHE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(key, matrix.clone());
    Ok(matrix)
}

/// Convert an embedding matrix into the row vectors the store consumes.
pub fn matrix_rows(matrix: &Array2<f32>) -> Vec<Vec<f32>> {
    matrix.rows().into_iter().map(|r| r.to_vec()).collect()
}
