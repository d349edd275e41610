//! ONNX embedding backend.
//!
//! Runs a late-interaction code embedding model exported to ONNX, with a
//! HuggingFace tokenizer configured separately for document and query
//! lengths. Model files are expected in `QUARRY_MODEL_DIR` (the download
//! and cache layer lives outside this crate).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use ndarray::Array2;
use ort::value::TensorRef;
use tokenizers::Tokenizer;

use super::{EmbedMode, Embedder};

/// Configuration of the bundled model.
pub struct ModelConfig {
    pub name: &'static str,
    pub precision: &'static str,
    pub token_dim: usize,
    pub doc_max_length: usize,
    pub query_max_length: usize,
    pub batch_size: usize,
}

pub const MODEL: &ModelConfig = &ModelConfig {
    name: "lateon-code-edge",
    precision: "int8",
    token_dim: 48,
    doc_max_length: 512,
    query_max_length: 256,
    batch_size: 64,
};

pub struct OnnxEmbedder {
    session: Mutex<ort::session::Session>,
    doc_tokenizer: Tokenizer,
    query_tokenizer: Tokenizer,
    config: &'static ModelConfig,
}

impl OnnxEmbedder {
    /// Locate the model under `QUARRY_MODEL_DIR`.
    pub fn from_env() -> Result<Self> {
        let dir = std::env::var("QUARRY_MODEL_DIR")
            .map(PathBuf::from)
            .context("QUARRY_MODEL_DIR is not set; install a model or use the hashing backend")?;
        Self::load(&dir, MODEL)
    }

    pub fn load(model_dir: &Path, config: &'static ModelConfig) -> Result<Self> {
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(available_threads())?
            .commit_from_file(model_dir.join("model.onnx"))
            .context("failed to load ONNX model")?;

        let base = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        let mut doc_tokenizer = base.clone();
        doc_tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: config.doc_max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        doc_tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        let mut query_tokenizer = base;
        query_tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: config.query_max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        query_tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        Ok(Self {
            session: Mutex::new(session),
            doc_tokenizer,
            query_tokenizer,
            config,
        })
    }

    fn encode(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<tokenizers::Encoding>> {
        let tokenizer = match mode {
            EmbedMode::Document => &self.doc_tokenizer,
            EmbedMode::Query => &self.query_tokenizer,
        };
        let inputs: Vec<tokenizers::EncodeInput> = texts
            .iter()
            .map(|t| tokenizers::EncodeInput::Single((*t).into()))
            .collect();
        tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| anyhow::anyhow!("{e}"))
    }

    fn embed_batch(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Array2<f32>>> {
        let encodings = self.encode(texts, mode)?;

        let batch_size = encodings.len();
        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        for (i, enc) in encodings.iter().enumerate() {
            for (j, &id) in enc.get_ids().iter().enumerate() {
                input_ids[i * seq_len + j] = id as i64;
            }
            for (j, &mask) in enc.get_attention_mask().iter().enumerate() {
                attention_mask[i * seq_len + j] = mask as i64;
            }
        }

        let input_ids = Array2::from_shape_vec((batch_size, seq_len), input_ids)?;
        let attention_mask = Array2::from_shape_vec((batch_size, seq_len), attention_mask)?;

        let input_ids_tensor = TensorRef::from_array_view(&input_ids)?;
        let attention_mask_tensor = TensorRef::from_array_view(&attention_mask)?;
        let mut session = self.session.lock().map_err(|e| anyhow::anyhow!("{e}"))?;
        let outputs = session.run(ort::inputs![
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
        ])?;

        let output = outputs.get("last_hidden_state").unwrap_or(&outputs[0]);
        let view = output.try_extract_array::<f32>()?;

        let mut result = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let num_tokens = encodings[i]
                .get_attention_mask()
                .iter()
                .filter(|&&m| m == 1)
                .count();

            let mut tokens = view.slice(ndarray::s![i, 0..num_tokens, ..]).to_owned();

            // L2 normalize each token vector so dot products are cosines.
            for mut row in tokens.rows_mut() {
                let norm: f32 = row.dot(&row).sqrt();
                if norm > 1e-9 {
                    row /= norm;
                }
            }
            result.push(tokens);
        }

        Ok(result)
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Array2<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size) {
            all.extend(self.embed_batch(chunk, mode)?);
        }
        Ok(all)
    }

    fn identity(&self) -> String {
        format!(
            "{}:{}:{}",
            self.config.name, self.config.precision, self.config.token_dim
        )
    }

    fn token_dim(&self) -> usize {
        self.config.token_dim
    }
}

fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
