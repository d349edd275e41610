//! Per-index metadata: schema version, embedder identity, and which file
//! bytes every block was derived from.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const SCHEMA_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub model_identity: String,
    pub created_at: u64,
    pub updated_at: u64,
    /// BTreeMap keeps serialization stable across runs.
    pub files: BTreeMap<String, FileRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub mtime_ns: u64,
    pub content_hash: String,
    pub block_ids: Vec<String>,
}

fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

impl Manifest {
    pub fn new(model_identity: &str) -> Self {
        let now = now_ns();
        Self {
            schema_version: SCHEMA_VERSION,
            model_identity: model_identity.to_string(),
            created_at: now,
            updated_at: now,
            files: BTreeMap::new(),
        }
    }

    pub fn path(index_dir: &Path) -> std::path::PathBuf {
        index_dir.join(MANIFEST_FILE)
    }

    pub fn exists(index_dir: &Path) -> bool {
        Self::path(index_dir).exists()
    }

    /// Load the manifest, verifying it matches this build. Schema or model
    /// mismatches are never migrated, only rejected.
    pub fn load(index_dir: &Path, model_identity: &str) -> Result<Self> {
        let path = Self::path(index_dir);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        // Parse loosely first: an incompatible schema may not deserialize.
        let value: serde_json::Value =
            serde_json::from_str(&content).context("manifest is not valid JSON")?;

        let version = value
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;
        if version != SCHEMA_VERSION {
            return Err(Error::IndexNeedsRebuild {
                reason: format!("schema version {version}, expected {SCHEMA_VERSION}"),
            }
            .into());
        }

        let stored_model = value
            .get("model_identity")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if stored_model != model_identity {
            return Err(Error::IndexNeedsRebuild {
                reason: format!("index built with model '{stored_model}', current is '{model_identity}'"),
            }
            .into());
        }

        let manifest: Manifest = serde_json::from_value(value).context("manifest is corrupt")?;
        Ok(manifest)
    }

    /// Atomic save: write to a temp file, then rename over the target.
    pub fn save(&mut self, index_dir: &Path) -> Result<()> {
        self.updated_at = now_ns();
        std::fs::create_dir_all(index_dir)?;

        let target = Self::path(index_dir);
        let tmp = index_dir.join(format!("{MANIFEST_FILE}.tmp"));
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &target)
            .with_context(|| format!("failed to replace {}", target.display()))?;
        Ok(())
    }

    pub fn block_count(&self) -> usize {
        self.files.values().map(|f| f.block_ids.len()).sum()
    }
}

/// 16-hex-char blake3 prefix of file bytes, as recorded in file records.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new("hashing:f32:64");
        manifest.files.insert(
            "src/lib.rs".to_string(),
            FileRecord {
                mtime_ns: 12345,
                content_hash: content_hash("fn a() {}"),
                block_ids: vec!["src/lib.rs:1:a".to_string()],
            },
        );
        manifest.save(dir.path()).unwrap();

        let loaded = Manifest::load(dir.path(), "hashing:f32:64").unwrap();
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.block_count(), 1);
        assert_eq!(loaded.files["src/lib.rs"].mtime_ns, 12345);
    }

    #[test]
    fn model_mismatch_needs_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new("other-model:f16:96");
        manifest.save(dir.path()).unwrap();

        let err = Manifest::load(dir.path(), "hashing:f32:64").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::IndexNeedsRebuild { .. })
        ));
    }

    #[test]
    fn schema_mismatch_needs_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            Manifest::path(dir.path()),
            r#"{"schema_version": 99, "model_identity": "hashing:f32:64", "created_at": 0, "updated_at": 0, "files": {}}"#,
        )
        .unwrap();

        let err = Manifest::load(dir.path(), "hashing:f32:64").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::IndexNeedsRebuild { .. })
        ));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        Manifest::new("hashing:f32:64").save(dir.path()).unwrap();
        assert!(Manifest::exists(dir.path()));
        assert!(!dir.path().join("manifest.json.tmp").exists());
    }

    #[test]
    fn content_hash_is_short_hex() {
        let h = content_hash("hello");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(h, content_hash("hello!"));
    }
}
