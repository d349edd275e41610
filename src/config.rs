use serde::{Deserialize, Serialize};

/// Name of the index marker directory created under an index root.
pub const INDEX_DIR: &str = ".quarry";

/// Embedding backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderBackend {
    /// Deterministic feature-hash embedder. Offline, no model files.
    Hashing,
    /// ONNX model runtime (requires the `onnx` cargo feature and a local
    /// model directory).
    Onnx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum file size to index, in bytes.
    pub max_file_size: u64,
    /// Number of blocks embedded per batch.
    pub batch_size: usize,
    /// Index hidden files and directories.
    pub include_hidden: bool,
    /// Build an index automatically when search finds none.
    pub auto_build: bool,
    /// Which embedding backend to use.
    pub embedder: EmbedderBackend,
    /// Glob patterns excluded from walking, in addition to ignore files.
    pub exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
            batch_size: 64,
            include_hidden: false,
            auto_build: false,
            embedder: default_backend(),
            exclude: Vec::new(),
        }
    }
}

fn default_backend() -> EmbedderBackend {
    if cfg!(feature = "onnx") {
        EmbedderBackend::Onnx
    } else {
        EmbedderBackend::Hashing
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("QUARRY_MAX_FILE_SIZE") {
            if let Ok(v) = val.parse() {
                config.max_file_size = v;
            }
        }
        if let Ok(val) = std::env::var("QUARRY_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                config.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("QUARRY_AUTO_BUILD") {
            config.auto_build = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("QUARRY_EMBEDDER") {
            match val.to_lowercase().as_str() {
                "hashing" | "hash" => config.embedder = EmbedderBackend::Hashing,
                "onnx" => config.embedder = EmbedderBackend::Onnx,
                other => {
                    tracing::warn!("unknown QUARRY_EMBEDDER value '{other}', keeping default");
                }
            }
        }

        config
    }
}
