//! Index discovery: walk-up lookup of the governing index, parent
//! detection for build refusal, and enumeration of subordinate indexes.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::INDEX_DIR;
use crate::index::manifest::Manifest;

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Whether `path` itself is an index root.
pub fn index_exists(path: &Path) -> bool {
    Manifest::exists(&path.join(INDEX_DIR))
}

/// Walk upward from `path` (inclusive) to the filesystem root, returning
/// the first directory holding an index.
pub fn find_index_root(path: &Path) -> Option<PathBuf> {
    let mut current = canonical(path);
    loop {
        if index_exists(&current) {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// The nearest index root strictly above `path`, if any. A build below an
/// existing index must be refused and redirected here.
pub fn find_parent_index(path: &Path) -> Option<PathBuf> {
    let mut current = canonical(path);
    if !current.pop() {
        return None;
    }
    loop {
        if index_exists(&current) {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Index roots at or below `path`. With `include_root` false, `path`
/// itself is excluded. Hidden directories are not descended into except
/// for the index marker itself.
pub fn find_subordinate_indexes(path: &Path, include_root: bool) -> Vec<PathBuf> {
    let path = canonical(path);
    let mut roots = Vec::new();

    for entry in WalkDir::new(&path).into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        !name.starts_with('.') || name == INDEX_DIR
    }) {
        let Ok(entry) = entry else { continue };
        if entry.file_name() != INDEX_DIR || !entry.file_type().is_dir() {
            continue;
        }
        if !Manifest::exists(entry.path()) {
            continue;
        }
        let Some(root) = entry.path().parent() else { continue };
        if !include_root && root == path {
            continue;
        }
        roots.push(root.to_path_buf());
    }

    roots.sort();
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_index(root: &Path) {
        let dir = root.join(INDEX_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        Manifest::new("hashing:f32:64").save(&dir).unwrap();
    }

    #[test]
    fn walk_up_finds_ancestor_index() {
        let tmp = tempfile::tempdir().unwrap();
        make_index(tmp.path());
        let nested = tmp.path().join("src/deep/module");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_index_root(&nested).unwrap();
        assert_eq!(found, canonical(tmp.path()));
    }

    #[test]
    fn no_index_anywhere() {
        let tmp = tempfile::tempdir().unwrap();
        // The temp dir has no index and (virtually always) no ancestor one
        // either; at minimum the walk must terminate.
        let _ = find_index_root(tmp.path());
        assert!(!index_exists(tmp.path()));
    }

    #[test]
    fn parent_excludes_self() {
        let tmp = tempfile::tempdir().unwrap();
        make_index(tmp.path());
        let sub = tmp.path().join("src");
        std::fs::create_dir_all(&sub).unwrap();

        assert_eq!(find_parent_index(&sub).unwrap(), canonical(tmp.path()));
        // The index root itself has no *parent* index.
        assert!(find_parent_index(tmp.path())
            .map(|p| p != canonical(tmp.path()))
            .unwrap_or(true));
    }

    #[test]
    fn subordinates_found_and_root_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        make_index(tmp.path());
        let sub_a = tmp.path().join("services/auth");
        let sub_b = tmp.path().join("services/billing");
        std::fs::create_dir_all(&sub_a).unwrap();
        std::fs::create_dir_all(&sub_b).unwrap();
        make_index(&sub_a);
        make_index(&sub_b);

        let subs = find_subordinate_indexes(tmp.path(), false);
        assert_eq!(subs.len(), 2);
        assert!(subs.iter().all(|p| p != &canonical(tmp.path())));

        let all = find_subordinate_indexes(tmp.path(), true);
        assert_eq!(all.len(), 3);
    }
}
