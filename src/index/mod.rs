//! Index orchestration: fresh builds, incremental updates, subordinate
//! index merging, and subtree removal.
//!
//! The index directory is owned by this module; nothing else writes to it.
//! Writers hold an advisory file lock, readers do not. A failed build
//! leaves the previous manifest in place, so the next run re-indexes
//! whatever the store and manifest disagree on.

pub mod locate;
pub mod manifest;

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use fs2::FileExt;
use rayon::prelude::*;

use crate::config::{Config, INDEX_DIR};
use crate::embed::{self, EmbedMode, Embedder};
use crate::error::Error;
use crate::extract::Extractor;
use crate::lexical;
use crate::models::{Block, IndexStats};
use crate::store::VectorStore;
use crate::walk::{self, ScannedFile};

use self::manifest::{content_hash, FileRecord, Manifest};

/// Subdirectory of the index dir holding the vector store.
const VECTORS_DIR: &str = "vectors";
const LOCK_FILE: &str = ".lock";

/// Progress sink: `(phase, current, total)` with phases `"scan"`,
/// `"extract"`, `"embed"`, `"store"` and `"merge"`.
pub type Progress<'a> = &'a (dyn Fn(&str, usize, usize) + Sync);

/// Options threaded through build and update operations.
#[derive(Default, Clone, Copy)]
pub struct BuildOptions<'a> {
    pub force: bool,
    pub progress: Option<Progress<'a>>,
    /// Polled at file, batch, and write boundaries; when set, the
    /// operation aborts without touching the manifest.
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> BuildOptions<'a> {
    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn report(&self, phase: &str, current: usize, total: usize) {
        if let Some(p) = self.progress {
            p(phase, current, total);
        }
    }
}

/// Advisory write lock on an index directory, released on drop.
struct IndexLock {
    _file: std::fs::File,
}

impl IndexLock {
    fn acquire(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(index_dir.join(LOCK_FILE))?;
        file.try_lock_exclusive().map_err(|_| Error::IndexLocked {
            path: index_dir.to_path_buf(),
        })?;
        Ok(Self { _file: file })
    }
}

/// Report produced by [`Indexer::status`].
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub file_count: usize,
    pub block_count: usize,
    pub schema_version: u32,
    pub model_identity: String,
    pub changed: usize,
    pub removed: usize,
}

/// Builds and maintains the index rooted at one directory.
pub struct Indexer {
    root: PathBuf,
    index_dir: PathBuf,
    config: Config,
    embedder: Arc<dyn Embedder>,
}

impl Indexer {
    pub fn create(root: &Path, config: Config) -> Result<Self> {
        if !root.exists() {
            return Err(Error::PathNotFound(root.to_path_buf()).into());
        }
        if !root.is_dir() {
            return Err(Error::PathNotADirectory(root.to_path_buf()).into());
        }
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let index_dir = root.join(INDEX_DIR);
        let embedder = embed::create_embedder(&config)?;

        Ok(Self {
            root,
            index_dir,
            config,
            embedder,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn is_indexed(&self) -> bool {
        locate::index_exists(&self.root)
    }

    pub fn open_store(&self) -> Result<VectorStore> {
        VectorStore::open(&self.index_dir.join(VECTORS_DIR), self.embedder.token_dim())
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        if !Manifest::exists(&self.index_dir) {
            return Err(Error::IndexMissing {
                path: self.root.clone(),
            }
            .into());
        }
        Manifest::load(&self.index_dir, &self.embedder.identity())
    }

    /// Build or refresh the index.
    ///
    /// Refuses to create a new index underneath an existing parent one.
    /// Fresh builds absorb subordinate indexes found below the root.
    pub fn build(&self, opts: BuildOptions) -> Result<IndexStats> {
        if self.is_indexed() {
            if opts.force {
                self.clear()?;
                return self.fresh_build(opts);
            }
            return self.update(opts);
        }

        if let Some(parent) = locate::find_parent_index(&self.root) {
            return Err(Error::ParentIndexExists { at: parent }.into());
        }

        self.fresh_build(opts)
    }

    fn fresh_build(&self, opts: BuildOptions) -> Result<IndexStats> {
        let _lock = IndexLock::acquire(&self.index_dir)?;

        // A failed earlier build may have left store files with no
        // manifest; those records are orphans, start clean.
        let vectors_dir = self.index_dir.join(VECTORS_DIR);
        if vectors_dir.exists() {
            std::fs::remove_dir_all(&vectors_dir)?;
        }

        let mut stats = IndexStats::default();
        let mut manifest = Manifest::new(&self.embedder.identity());
        let store = self.open_store()?;

        self.merge_subordinates(&store, &mut manifest, &opts)?;

        opts.report("scan", 0, 0);
        let files = walk::scan(&self.root, &self.config)?;
        opts.report("scan", files.len(), files.len());

        self.index_files(&store, &mut manifest, files, &opts, &mut stats)?;

        store.flush().map_err(|e| Error::StoreWrite(e.to_string()))?;
        manifest.save(&self.index_dir)?;
        tracing::info!("{}", stats.summary());
        Ok(stats)
    }

    /// Fold every subordinate index into this one: token vectors are
    /// copied by id without re-embedding, manifest entries are re-keyed
    /// under the subdirectory prefix, and the subordinate index dir is
    /// removed. Incompatible subordinates are dropped; their files get
    /// re-indexed from source during the walk.
    fn merge_subordinates(
        &self,
        store: &VectorStore,
        manifest: &mut Manifest,
        opts: &BuildOptions,
    ) -> Result<()> {
        let subs = locate::find_subordinate_indexes(&self.root, false);
        let total = subs.len();

        for (i, sub_root) in subs.iter().enumerate() {
            opts.report("merge", i, total);
            let sub_index_dir = sub_root.join(INDEX_DIR);
            let prefix = sub_root
                .strip_prefix(&self.root)
                .map(|p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_default();
            if prefix.is_empty() {
                continue;
            }

            match Manifest::load(&sub_index_dir, &self.embedder.identity()) {
                Ok(sub_manifest) => {
                    let sub_store =
                        VectorStore::open(&sub_index_dir.join(VECTORS_DIR), self.embedder.token_dim())?;
                    let copied = store.merge_from(&sub_store, &prefix)?;
                    for (rel, record) in sub_manifest.files {
                        manifest.files.insert(
                            format!("{prefix}/{rel}"),
                            FileRecord {
                                mtime_ns: record.mtime_ns,
                                content_hash: record.content_hash,
                                block_ids: record
                                    .block_ids
                                    .iter()
                                    .map(|id| format!("{prefix}/{id}"))
                                    .collect(),
                            },
                        );
                    }
                    tracing::info!("merged {copied} blocks from {}", sub_root.display());
                }
                Err(e) => {
                    tracing::warn!(
                        "subordinate index at {} is incompatible ({e}); re-indexing from source",
                        sub_root.display()
                    );
                }
            }

            std::fs::remove_dir_all(&sub_index_dir).with_context(|| {
                format!("failed to remove subordinate index {}", sub_index_dir.display())
            })?;
        }
        opts.report("merge", total, total);
        Ok(())
    }

    /// Incremental update: metadata-only staleness scan, hash
    /// confirmation for mtime changes, selective re-index, removal of
    /// deleted files.
    pub fn update(&self, opts: BuildOptions) -> Result<IndexStats> {
        let mut manifest = self.load_manifest()?;
        let mut stats = IndexStats::default();

        opts.report("scan", 0, 0);
        let current = walk::scan_metadata(&self.root, &self.config)?;
        opts.report("scan", current.len(), current.len());

        let mut to_read: Vec<&String> = Vec::new();
        for (rel, meta) in &current {
            match manifest.files.get(rel) {
                Some(record) if record.mtime_ns == meta.mtime_ns => {}
                _ => to_read.push(rel),
            }
        }
        let removed: Vec<String> = manifest
            .files
            .keys()
            .filter(|rel| !current.contains_key(*rel))
            .cloned()
            .collect();

        if to_read.is_empty() && removed.is_empty() {
            stats.skipped = current.len();
            return Ok(stats);
        }

        let _lock = IndexLock::acquire(&self.index_dir)?;
        let store = self.open_store()?;

        // Confirm mtime changes against content hashes: a touched but
        // unmodified file only gets its recorded mtime refreshed.
        let mut to_index: Vec<ScannedFile> = Vec::new();
        for rel in to_read {
            if opts.cancelled() {
                anyhow::bail!("update cancelled");
            }
            let path = self.root.join(rel);
            let Some(file) = walk::read_file(&self.root, &path) else {
                continue;
            };
            if let Some(record) = manifest.files.get_mut(rel) {
                if record.content_hash == content_hash(&file.content) {
                    record.mtime_ns = file.mtime_ns;
                    stats.skipped += 1;
                    continue;
                }
            }
            to_index.push(file);
        }

        for rel in &removed {
            if let Some(record) = manifest.files.remove(rel) {
                for id in &record.block_ids {
                    store.delete(id);
                }
                stats.deleted += record.block_ids.len();
            }
        }

        self.index_files(&store, &mut manifest, to_index, &opts, &mut stats)?;

        store.flush().map_err(|e| Error::StoreWrite(e.to_string()))?;
        manifest.save(&self.index_dir)?;
        tracing::info!("{}", stats.summary());
        Ok(stats)
    }

    /// Shared extract -> embed -> store path for build and update.
    fn index_files(
        &self,
        store: &VectorStore,
        manifest: &mut Manifest,
        files: Vec<ScannedFile>,
        opts: &BuildOptions,
        stats: &mut IndexStats,
    ) -> Result<()> {
        // Skip files whose recorded content is current (covers entries
        // folded in from merged subordinate indexes).
        let mut to_process: Vec<(ScannedFile, String)> = Vec::new();
        for file in files {
            let hash = content_hash(&file.content);
            match manifest.files.get_mut(&file.relative) {
                Some(record) if record.content_hash == hash => {
                    record.mtime_ns = file.mtime_ns;
                    stats.skipped += 1;
                }
                _ => to_process.push((file, hash)),
            }
        }

        if to_process.is_empty() {
            return Ok(());
        }

        let total = to_process.len();
        opts.report("extract", 0, total);
        let cancel = opts.cancel;
        let extracted: Vec<(ScannedFile, String, Result<Vec<Block>>)> = to_process
            .into_par_iter()
            .map_init(Extractor::new, |extractor, (file, hash)| {
                if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                    return (file, hash, Ok(Vec::new()));
                }
                let blocks = extractor.extract(&file.relative, &file.content);
                (file, hash, blocks)
            })
            .collect();
        opts.report("extract", total, total);

        if opts.cancelled() {
            anyhow::bail!("build cancelled");
        }

        struct Prepared {
            block: Block,
            text: String,
        }

        let mut prepared: Vec<Prepared> = Vec::new();
        for (file, hash, result) in extracted {
            match result {
                Ok(blocks) => {
                    // Stale ids go before the new ones come in.
                    if let Some(old) = manifest.files.get(&file.relative) {
                        for id in &old.block_ids {
                            store.delete(id);
                        }
                        stats.deleted += old.block_ids.len();
                    }
                    manifest.files.insert(
                        file.relative.clone(),
                        FileRecord {
                            mtime_ns: file.mtime_ns,
                            content_hash: hash,
                            block_ids: blocks.iter().map(|b| b.id.clone()).collect(),
                        },
                    );
                    stats.files += 1;
                    for block in blocks {
                        let text = block.embedding_text();
                        prepared.push(Prepared { block, text });
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to extract {}: {e}", file.relative);
                    stats.errors += 1;
                }
            }
        }

        // Length-sorted batches keep padding waste down in the embedder.
        prepared.sort_by_key(|p| p.text.len());

        let total = prepared.len();
        let batch_size = self.config.batch_size.max(1);
        for start in (0..total).step_by(batch_size) {
            if opts.cancelled() {
                anyhow::bail!("build cancelled");
            }
            let end = (start + batch_size).min(total);
            opts.report("embed", start, total);

            let texts: Vec<&str> = prepared[start..end].iter().map(|p| p.text.as_str()).collect();
            let matrices = self
                .embedder
                .embed(&texts, EmbedMode::Document)
                .map_err(|e| Error::EmbeddingBatch(e.to_string()))?;

            opts.report("store", start, total);
            for (matrix, item) in matrices.iter().zip(&prepared[start..end]) {
                let block = &item.block;
                let metadata = serde_json::json!({
                    "file": block.relative_path,
                    "language": block.language,
                    "kind": block.kind,
                    "name": block.name,
                    "start_line": block.start_line,
                    "end_line": block.end_line,
                    "content": block.content,
                });
                let lexical_text = lexical::split_identifiers(&item.text);
                store
                    .store(&block.id, embed::matrix_rows(matrix), &lexical_text, metadata)
                    .map_err(|e| Error::StoreWrite(e.to_string()))?;
                stats.blocks += 1;
            }
        }
        opts.report("embed", total, total);

        Ok(())
    }

    /// Delete the index directory entirely.
    pub fn clear(&self) -> Result<()> {
        if self.index_dir.exists() {
            std::fs::remove_dir_all(&self.index_dir)?;
        }
        Ok(())
    }

    /// Remove every block whose file lives under `prefix` (a
    /// root-relative path). Used by `clean` on a subtree of a parent
    /// index.
    pub fn remove_prefix(&self, prefix: &str) -> Result<IndexStats> {
        let prefix = prefix.trim_end_matches('/');
        let mut stats = IndexStats::default();
        if prefix.is_empty() || prefix == "." {
            return Ok(stats);
        }

        let mut manifest = self.load_manifest()?;
        let _lock = IndexLock::acquire(&self.index_dir)?;
        let store = self.open_store()?;

        let targets: Vec<String> = manifest
            .files
            .keys()
            .filter(|rel| *rel == prefix || rel.starts_with(&format!("{prefix}/")))
            .cloned()
            .collect();

        for rel in &targets {
            if let Some(record) = manifest.files.remove(rel) {
                for id in &record.block_ids {
                    store.delete(id);
                }
                stats.blocks += record.block_ids.len();
                stats.files += 1;
            }
        }

        store.flush().map_err(|e| Error::StoreWrite(e.to_string()))?;
        manifest.save(&self.index_dir)?;
        Ok(stats)
    }

    /// Manifest summary plus a metadata-only staleness count.
    pub fn status(&self) -> Result<StatusReport> {
        let manifest = self.load_manifest()?;
        let current = walk::scan_metadata(&self.root, &self.config)?;

        let changed = current
            .iter()
            .filter(|(rel, meta)| {
                manifest
                    .files
                    .get(*rel)
                    .map_or(true, |record| record.mtime_ns != meta.mtime_ns)
            })
            .count();
        let removed = manifest
            .files
            .keys()
            .filter(|rel| !current.contains_key(*rel))
            .count();

        Ok(StatusReport {
            file_count: manifest.files.len(),
            block_count: manifest.block_count(),
            schema_version: manifest.schema_version,
            model_identity: manifest.model_identity.clone(),
            changed,
            removed,
        })
    }

    /// Block ids for one file, in extraction order.
    pub fn file_blocks(&self, manifest: &Manifest, relative: &str) -> Option<Vec<String>> {
        manifest.files.get(relative).map(|r| r.block_ids.clone())
    }

    /// Turn an absolute or cwd-relative path into a root-relative one.
    pub fn to_relative(&self, path: &Path) -> String {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        canonical
            .strip_prefix(&self.root)
            .unwrap_or(&canonical)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Map of `(id, content_hash)` pairs describing a built index; used to
/// compare stores for equivalence in tests.
pub fn index_fingerprint(manifest: &Manifest) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for record in manifest.files.values() {
        for id in &record.block_ids {
            out.insert(id.clone(), record.content_hash.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbedderBackend;

    fn test_config() -> Config {
        Config {
            embedder: EmbedderBackend::Hashing,
            ..Config::default()
        }
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn build(root: &Path) -> IndexStats {
        let indexer = Indexer::create(root, test_config()).unwrap();
        indexer.build(BuildOptions::default()).unwrap()
    }

    #[test]
    fn fresh_build_writes_manifest_and_store() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "src/auth.py", "def authenticate_user(user, pw):\n    return True\n");
        write(tmp.path(), "src/db.rs", "fn connect() {}\n");

        let stats = build(tmp.path());
        assert_eq!(stats.files, 2);
        assert!(stats.blocks >= 2);

        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        let manifest = indexer.load_manifest().unwrap();
        assert_eq!(manifest.files.len(), 2);

        let store = indexer.open_store().unwrap();
        assert_eq!(store.count(), manifest.block_count());
        // Every manifest id exists in the store.
        for record in manifest.files.values() {
            for id in &record.block_ids {
                assert!(store.get_tokens(id).is_some(), "missing store record {id}");
            }
        }
    }

    #[test]
    fn build_twice_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.py", "def alpha(): pass\n");
        write(tmp.path(), "b.py", "def beta(): pass\n");

        build(tmp.path());
        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        let first = index_fingerprint(&indexer.load_manifest().unwrap());
        let first_count = indexer.open_store().unwrap().count();

        let stats = indexer.build(BuildOptions::default()).unwrap();
        assert_eq!(stats.blocks, 0, "unchanged tree must not re-embed");
        assert_eq!(stats.skipped, 2);

        let second = index_fingerprint(&indexer.load_manifest().unwrap());
        assert_eq!(first, second);
        assert_eq!(indexer.open_store().unwrap().count(), first_count);
    }

    #[test]
    fn refuses_to_build_under_parent_index() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "src/lib.rs", "fn a() {}\n");
        build(tmp.path());

        let sub = tmp.path().join("src");
        let indexer = Indexer::create(&sub, test_config()).unwrap();
        let err = indexer.build(BuildOptions::default()).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::ParentIndexExists { at }) => {
                assert_eq!(at, &tmp.path().canonicalize().unwrap());
            }
            other => panic!("expected ParentIndexExists, got {other:?}"),
        }
    }

    #[test]
    fn incremental_update_touches_only_changed_files() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "one.py", "def one(): pass\n");
        write(tmp.path(), "two.py", "def two(): pass\n");
        write(tmp.path(), "three.py", "def three(): pass\n");
        build(tmp.path());

        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        let before = indexer.load_manifest().unwrap();
        let one_before = before.files["one.py"].block_ids.clone();
        let three_before = before.files["three.py"].block_ids.clone();

        std::thread::sleep(std::time::Duration::from_millis(20));
        write(tmp.path(), "two.py", "def two(): pass\n\ndef two_more(): pass\n");
        let stats = indexer.update(BuildOptions::default()).unwrap();
        assert_eq!(stats.files, 1);

        let after = indexer.load_manifest().unwrap();
        assert_eq!(after.files["one.py"].block_ids, one_before);
        assert_eq!(after.files["three.py"].block_ids, three_before);
        assert!(after.files["two.py"]
            .block_ids
            .iter()
            .any(|id| id.contains("two_more")));
    }

    #[test]
    fn removed_files_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "keep.py", "def keep(): pass\n");
        write(tmp.path(), "gone.py", "def gone(): pass\n");
        build(tmp.path());

        std::fs::remove_file(tmp.path().join("gone.py")).unwrap();
        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        let stats = indexer.update(BuildOptions::default()).unwrap();
        assert!(stats.deleted >= 1);

        let manifest = indexer.load_manifest().unwrap();
        assert!(manifest.files.contains_key("keep.py"));
        assert!(!manifest.files.contains_key("gone.py"));

        let store = indexer.open_store().unwrap();
        assert_eq!(store.count(), manifest.block_count());
    }

    #[test]
    fn touched_but_unchanged_file_skips_reindex() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "same.py", "def same(): pass\n");
        build(tmp.path());

        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        let before = indexer.load_manifest().unwrap().files["same.py"].clone();

        // Rewrite identical bytes: mtime moves, content hash does not.
        std::thread::sleep(std::time::Duration::from_millis(20));
        write(tmp.path(), "same.py", "def same(): pass\n");

        let stats = indexer.update(BuildOptions::default()).unwrap();
        assert_eq!(stats.files, 0, "no re-index for identical content");
        assert_eq!(stats.skipped, 1);

        let after = indexer.load_manifest().unwrap().files["same.py"].clone();
        assert_eq!(after.content_hash, before.content_hash);
        assert_eq!(after.block_ids, before.block_ids);
    }

    #[test]
    fn modified_content_with_same_length_is_reindexed() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "mut.py", "def aaa(): pass\n");
        build(tmp.path());

        std::thread::sleep(std::time::Duration::from_millis(20));
        write(tmp.path(), "mut.py", "def bbb(): pass\n");

        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        let stats = indexer.update(BuildOptions::default()).unwrap();
        assert_eq!(stats.files, 1);

        let manifest = indexer.load_manifest().unwrap();
        assert!(manifest.files["mut.py"].block_ids[0].contains("bbb"));
    }

    #[test]
    fn incremental_equals_fresh_rebuild() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.py", "def alpha(): pass\n");
        write(tmp.path(), "b.py", "def beta(): pass\n");
        build(tmp.path());

        // Edit, add, remove.
        std::thread::sleep(std::time::Duration::from_millis(20));
        write(tmp.path(), "a.py", "def alpha_two(): pass\n");
        write(tmp.path(), "c.py", "def gamma(): pass\n");
        std::fs::remove_file(tmp.path().join("b.py")).unwrap();

        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        indexer.update(BuildOptions::default()).unwrap();
        let incremental = index_fingerprint(&indexer.load_manifest().unwrap());

        indexer.clear().unwrap();
        build(tmp.path());
        let fresh = index_fingerprint(&indexer.load_manifest().unwrap());

        assert_eq!(incremental, fresh);
    }

    #[test]
    fn fresh_build_merges_subordinate_indexes() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "top.py", "def top(): pass\n");
        write(tmp.path(), "sub/inner.py", "def inner(): pass\n");

        // Index the subdirectory first.
        build(&tmp.path().join("sub"));
        assert!(locate::index_exists(&tmp.path().join("sub")));

        // Parent build absorbs it and removes the subordinate dir.
        build(tmp.path());
        assert!(!tmp.path().join("sub").join(INDEX_DIR).exists());

        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        let manifest = indexer.load_manifest().unwrap();
        assert!(manifest.files.contains_key("top.py"));
        assert!(manifest.files.contains_key("sub/inner.py"));

        let store = indexer.open_store().unwrap();
        assert_eq!(store.count(), manifest.block_count());
        assert!(manifest.files["sub/inner.py"].block_ids[0].starts_with("sub/"));
    }

    #[test]
    fn remove_prefix_drops_subtree_only() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "src/auth.py", "def auth(): pass\n");
        write(tmp.path(), "docs/readme.py", "def doc(): pass\n");
        build(tmp.path());

        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        let stats = indexer.remove_prefix("src").unwrap();
        assert_eq!(stats.files, 1);

        let manifest = indexer.load_manifest().unwrap();
        assert!(!manifest.files.contains_key("src/auth.py"));
        assert!(manifest.files.contains_key("docs/readme.py"));

        let store = indexer.open_store().unwrap();
        assert_eq!(store.count(), manifest.block_count());
    }

    #[test]
    fn cancellation_leaves_manifest_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "x.py", "def x(): pass\n");

        let cancel = AtomicBool::new(true);
        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        let result = indexer.build(BuildOptions {
            cancel: Some(&cancel),
            ..Default::default()
        });
        assert!(result.is_err());
        assert!(!indexer.is_indexed());
    }

    #[test]
    fn status_reports_counts() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.py", "def a(): pass\n");
        build(tmp.path());

        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        let status = indexer.status().unwrap();
        assert_eq!(status.file_count, 1);
        assert!(status.block_count >= 1);
        assert_eq!(status.schema_version, manifest::SCHEMA_VERSION);
        assert_eq!(status.model_identity, "hashing:f32:64");
        assert_eq!(status.changed, 0);
        assert_eq!(status.removed, 0);

        std::thread::sleep(std::time::Duration::from_millis(20));
        write(tmp.path(), "b.py", "def b(): pass\n");
        let status = indexer.status().unwrap();
        assert_eq!(status.changed, 1);
    }

    #[test]
    fn progress_phases_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.py", "def a(): pass\n");

        let phases = parking_lot::Mutex::new(Vec::new());
        let progress = |phase: &str, _c: usize, _t: usize| {
            phases.lock().push(phase.to_string());
        };
        let indexer = Indexer::create(tmp.path(), test_config()).unwrap();
        indexer
            .build(BuildOptions {
                progress: Some(&progress),
                ..Default::default()
            })
            .unwrap();

        let seen = phases.lock();
        assert!(seen.iter().any(|p| p == "scan"));
        assert!(seen.iter().any(|p| p == "extract"));
        assert!(seen.iter().any(|p| p == "embed"));
    }
}
