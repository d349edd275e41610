//! Directory traversal for indexing and freshness checks.
//!
//! Two modes: [`scan`] reads file contents (build path), [`scan_metadata`]
//! stats only (freshness path). Both honor `.gitignore`, a hardcoded set of
//! ignored directory names, a size cap, and binary detection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

use crate::config::{Config, INDEX_DIR};

/// Directory names never descended into, regardless of ignore files.
const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "build",
    "dist",
    ".git",
    ".venv",
    "venv",
    "__pycache__",
    ".pixi",
    INDEX_DIR,
];

/// Extensions that are always binary; skipped without reading.
const BINARY_EXTENSIONS: &[&str] = &[
    // Compiled/object files
    "pyc", "pyo", "o", "so", "dylib", "dll", "bin", "exe", "a", "lib", "class", "wasm",
    // Archives
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "jar", "war", "whl",
    // Documents/media
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    // Images
    "png", "jpg", "jpeg", "gif", "ico", "svg", "webp", "bmp", "tiff",
    // Audio/video
    "mp3", "mp4", "wav", "avi", "mov", "mkv",
    // Data and model files
    "db", "sqlite", "sqlite3", "pkl", "npy", "npz", "onnx", "pt", "pth", "safetensors",
    // Lock files
    "lock",
];

/// A file record produced by [`scan`]: content read and UTF-8 validated.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub absolute: PathBuf,
    /// Relative to the walk root, forward slashes.
    pub relative: String,
    pub mtime_ns: u64,
    pub size: u64,
    pub content: String,
}

/// Stat-only record produced by [`scan_metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub mtime_ns: u64,
    pub size: u64,
}

fn exclude_set(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        match Glob::new(pat) {
            Ok(g) => {
                builder.add(g);
            }
            Err(e) => tracing::warn!("ignoring invalid exclude glob '{pat}': {e}"),
        }
    }
    builder.build().ok()
}

fn walker(root: &Path, config: &Config) -> ignore::Walk {
    WalkBuilder::new(root)
        .hidden(!config.include_hidden)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .follow_links(false)
        .max_filesize(Some(config.max_file_size))
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().map_or(false, |ft| ft.is_dir()) {
                return !IGNORED_DIRS.contains(&name.as_ref());
            }
            true
        })
        .build()
}

fn relative_posix(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str()))
}

fn mtime_ns(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Whether a path should be indexed at all, by extension and excludes.
fn eligible(root: &Path, path: &Path, excludes: Option<&GlobSet>) -> bool {
    if has_binary_extension(path) {
        return false;
    }
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if name.ends_with("-lock.json") || name.ends_with(".min.js") {
            return false;
        }
    }
    if let Some(set) = excludes {
        let rel = path.strip_prefix(root).unwrap_or(path);
        if set.is_match(rel) {
            return false;
        }
    }
    true
}

/// Read one file, rejecting binary content (null byte in the first 8 KiB)
/// and invalid UTF-8. Returns None when the file should be skipped.
pub fn read_file(root: &Path, path: &Path) -> Option<ScannedFile> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("cannot stat {}: {e}", path.display());
            return None;
        }
    };
    let raw = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("cannot read {}: {e}", path.display());
            return None;
        }
    };

    let check_len = raw.len().min(8192);
    if raw[..check_len].contains(&0) {
        return None;
    }

    let content = String::from_utf8(raw).ok()?;

    Some(ScannedFile {
        relative: relative_posix(root, path),
        absolute: path.to_path_buf(),
        mtime_ns: mtime_ns(&meta),
        size: meta.len(),
        content,
    })
}

/// Walk `root` and read every indexable file.
///
/// Inaccessible entries are logged and skipped; they never fail the walk.
pub fn scan(root: &Path, config: &Config) -> Result<Vec<ScannedFile>> {
    let excludes = exclude_set(&config.exclude);
    let mut results = Vec::new();

    for entry in walker(root, config) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("walk error: {e}");
                continue;
            }
        };
        if entry.file_type().map_or(true, |ft| !ft.is_file()) {
            continue;
        }
        let path = entry.path();
        if !eligible(root, path, excludes.as_ref()) {
            continue;
        }
        if let Some(file) = read_file(root, path) {
            results.push(file);
        }
    }

    Ok(results)
}

/// Walk `root` collecting stat metadata only. Used by the freshness path;
/// no file content is read.
pub fn scan_metadata(root: &Path, config: &Config) -> Result<BTreeMap<String, FileMeta>> {
    let excludes = exclude_set(&config.exclude);
    let mut results = BTreeMap::new();

    for entry in walker(root, config) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("walk error: {e}");
                continue;
            }
        };
        if entry.file_type().map_or(true, |ft| !ft.is_file()) {
            continue;
        }
        let path = entry.path();
        if !eligible(root, path, excludes.as_ref()) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if meta.len() > config.max_file_size {
            continue;
        }
        results.insert(
            relative_posix(root, path),
            FileMeta {
                mtime_ns: mtime_ns(&meta),
                size: meta.len(),
            },
        );
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn scans_source_files() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "src/main.rs", "fn main() {}");
        write(tmp.path(), "README.md", "# hi");

        let files = scan(tmp.path(), &Config::default()).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert!(rels.contains(&"src/main.rs"));
        assert!(rels.contains(&"README.md"));
    }

    #[test]
    fn skips_ignored_directories() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "node_modules/pkg/index.js", "x");
        write(tmp.path(), "target/debug/foo.rs", "x");
        write(tmp.path(), ".quarry/manifest.json", "{}");
        write(tmp.path(), "src/lib.rs", "pub fn a() {}");

        let files = scan(tmp.path(), &Config::default()).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(rels, vec!["src/lib.rs"]);
    }

    #[test]
    fn skips_binary_extension_and_content() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "img.png", "not really an image");
        std::fs::write(tmp.path().join("blob.dat"), [0u8, 159, 146, 150]).unwrap();
        write(tmp.path(), "ok.py", "def f(): pass");

        let files = scan(tmp.path(), &Config::default()).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(rels, vec!["ok.py"]);
    }

    #[test]
    fn respects_size_cap() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "big.txt", &"x".repeat(4096));
        write(tmp.path(), "small.txt", "tiny");

        let config = Config {
            max_file_size: 1024,
            ..Config::default()
        };
        let files = scan(tmp.path(), &config).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(rels, vec!["small.txt"]);
    }

    #[test]
    fn exclude_globs() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "gen/schema.rs", "pub struct S;");
        write(tmp.path(), "src/lib.rs", "pub fn a() {}");

        let config = Config {
            exclude: vec!["gen/**".to_string()],
            ..Config::default()
        };
        let files = scan(tmp.path(), &config).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(rels, vec!["src/lib.rs"]);
    }

    #[test]
    fn metadata_matches_scan() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.rs", "fn a() {}");
        write(tmp.path(), "b.py", "def b(): pass");

        let config = Config::default();
        let full = scan(tmp.path(), &config).unwrap();
        let meta = scan_metadata(tmp.path(), &config).unwrap();

        assert_eq!(full.len(), meta.len());
        for f in &full {
            let m = meta.get(&f.relative).expect("metadata entry");
            assert_eq!(m.mtime_ns, f.mtime_ns);
            assert_eq!(m.size, f.size);
        }
    }
}
