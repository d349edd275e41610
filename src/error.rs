use std::path::PathBuf;

use thiserror::Error;

use crate::models::EXIT_ERROR;

/// Structural errors surfaced to callers. Per-file extraction problems are
/// counted in `IndexStats` instead; these variants short-circuit.
#[derive(Debug, Error)]
pub enum Error {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("not a directory: {0}")]
    PathNotADirectory(PathBuf),

    #[error("no index found for {path}. Run 'quarry build {path}' to create one")]
    IndexMissing { path: PathBuf },

    #[error("index needs rebuild ({reason}). Run 'quarry build --force'")]
    IndexNeedsRebuild { reason: String },

    #[error("index at {path} is locked by another process")]
    IndexLocked { path: PathBuf },

    #[error("an index at {at} already covers this path. Run 'quarry build {at}' instead")]
    ParentIndexExists { at: PathBuf },

    #[error("embedding batch failed: {0}")]
    EmbeddingBatch(String),

    #[error("store write failed: {0}")]
    StoreWrite(String),
}

impl Error {
    /// Process exit code for this error. All structural errors exit 2.
    pub fn exit_code(&self) -> i32 {
        EXIT_ERROR
    }
}
