//! Query execution: index discovery, freshness, the two candidate
//! streams, score fusion, boosting, and scope filtering.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSetBuilder};
use serde_json::Value;

use crate::boost;
use crate::config::Config;
use crate::embed::{self, matrix_rows};
use crate::error::Error;
use crate::index::{locate, BuildOptions, Indexer};
use crate::lexical;
use crate::models::{BlockKind, FileRef, Language, SearchResult};
use crate::store::{Hit, QueryOptions, VectorStore};

/// Extra candidates fetched when a scope filter will discard results.
const SCOPED_OVERFETCH: usize = 5;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub k: usize,
    /// Minimum score; 0 disables the cutoff.
    pub threshold: f32,
    /// Extension filter (`py`, `rs`, ...), empty means all.
    pub extensions: Vec<String>,
    /// Glob patterns dropped from results.
    pub exclude: Vec<String>,
    /// Skip markdown and plain-text blocks.
    pub code_only: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            k: 10,
            threshold: 0.0,
            extensions: Vec::new(),
            exclude: Vec::new(),
            code_only: false,
        }
    }
}

/// A located, freshness-checked index ready to serve queries.
pub struct Searcher {
    indexer: Indexer,
    store: VectorStore,
    /// Root-relative scope prefix when the search path sits below the
    /// index root.
    scope: Option<String>,
}

impl std::fmt::Debug for Searcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searcher")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl Searcher {
    /// Walk upward from `path` to the governing index, refresh stale
    /// files, and open the store.
    ///
    /// Without an index: builds one when `config.auto_build` is set
    /// (`QUARRY_AUTO_BUILD=1`), otherwise fails with `IndexMissing`.
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        if !path.exists() {
            return Err(Error::PathNotFound(path.to_path_buf()).into());
        }

        let root = match locate::find_index_root(path) {
            Some(root) => root,
            None if config.auto_build => {
                let indexer = Indexer::create(path, config.clone())?;
                indexer.build(BuildOptions::default())?;
                indexer.root().to_path_buf()
            }
            None => {
                return Err(Error::IndexMissing {
                    path: path.to_path_buf(),
                }
                .into())
            }
        };

        let indexer = Indexer::create(&root, config.clone())?;
        indexer.update(BuildOptions::default())?;

        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let scope = if canonical != *indexer.root() {
            let rel = indexer.to_relative(&canonical);
            (!rel.is_empty()).then_some(rel)
        } else {
            None
        };

        let store = indexer.open_store()?;
        Ok(Self {
            indexer,
            store,
            scope,
        })
    }

    pub fn root(&self) -> &Path {
        self.indexer.root()
    }

    /// Hybrid search for a text query.
    pub fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let overfetch = if self.scope.is_some() { SCOPED_OVERFETCH } else { 1 };
        let fetch = opts.k.max(1) * overfetch;

        let matrix = embed::embed_query_cached(self.indexer.embedder().as_ref(), query)?;
        let query_tokens = matrix_rows(&matrix);
        let query_text_split = lexical::subtokens(query).join(" ");

        // Two candidate streams: hybrid BM25+MaxSim, and pure MaxSim for
        // conceptual queries with poor lexical recall.
        let hybrid = self
            .store
            .search_multi_with_text(&query_tokens, &query_text_split, fetch, None)?;
        let semantic = self
            .store
            .query_with_options(&query_tokens, fetch, QueryOptions::default())?;

        let mut results = merge_streams(hybrid, semantic);
        boost::apply(&mut results, query);
        self.finish(results, opts)
    }

    /// Blocks similar to a referenced one, queried by its stored token
    /// matrix instead of text. Results from the reference file itself are
    /// dropped, as are prose chunks.
    pub fn find_similar(&self, file_ref: &FileRef, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let manifest = self.indexer.load_manifest()?;

        let rel = self.resolve_relative(file_ref.path(), &manifest)?;
        let record = manifest
            .files
            .get(&rel)
            .with_context(|| format!("file not in index: {rel}"))?;
        if record.block_ids.is_empty() {
            anyhow::bail!("no blocks indexed for {rel}");
        }

        let block_id = match file_ref {
            FileRef::ByName { name, .. } => self.block_by_name(&record.block_ids, name)?,
            FileRef::ByLine { line, .. } => self
                .block_by_line(&record.block_ids, *line)
                .unwrap_or_else(|| record.block_ids[0].clone()),
        };

        let (tokens, metadata) = self
            .store
            .get_tokens(&block_id)
            .with_context(|| format!("block {block_id} missing from store"))?;
        let reference_name = metadata
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let same_file: HashSet<&str> = record.block_ids.iter().map(|s| s.as_str()).collect();
        let hits = self.store.query_with_options(
            &tokens,
            opts.k.max(1) + record.block_ids.len(),
            QueryOptions::default(),
        )?;

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .filter(|hit| !same_file.contains(hit.id.as_str()))
            .filter_map(|hit| hit_to_result(&hit))
            .filter(|r| r.kind != BlockKind::TextChunk && !r.language.is_prose())
            .collect();

        boost::apply(&mut results, &reference_name);
        self.finish(results, opts)
    }

    /// Scope filter, result filters, deterministic ordering, top-k.
    fn finish(
        &self,
        mut results: Vec<SearchResult>,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        if let Some(scope) = &self.scope {
            let prefix = format!("{scope}/");
            results.retain(|r| r.file == *scope || r.file.starts_with(&prefix));
        }

        if !opts.extensions.is_empty() {
            let wanted: HashSet<String> = opts
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect();
            results.retain(|r| {
                Path::new(&r.file)
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .is_some_and(|ext| wanted.contains(&ext))
            });
        }

        if !opts.exclude.is_empty() {
            let mut builder = GlobSetBuilder::new();
            for pat in &opts.exclude {
                if let Ok(g) = Glob::new(pat) {
                    builder.add(g);
                }
            }
            if let Ok(set) = builder.build() {
                results.retain(|r| !set.is_match(&r.file));
            }
        }

        if opts.code_only {
            results.retain(|r| !r.language.is_prose());
        }

        if opts.threshold > 0.0 {
            results.retain(|r| r.score >= opts.threshold);
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.line.cmp(&b.line))
        });
        results.truncate(opts.k);
        Ok(results)
    }

    /// Map a user-typed path onto a manifest key.
    fn resolve_relative(&self, path: &str, manifest: &crate::index::manifest::Manifest) -> Result<String> {
        let rel = self.indexer.to_relative(Path::new(path));
        if manifest.files.contains_key(&rel) {
            return Ok(rel);
        }
        let trimmed = path.trim_start_matches("./");
        if manifest.files.contains_key(trimmed) {
            return Ok(trimmed.to_string());
        }
        Ok(rel)
    }

    fn block_by_name(&self, block_ids: &[String], name: &str) -> Result<String> {
        let suffix = format!(".{name}");
        let mut matches = Vec::new();

        for id in block_ids {
            let Some((_, meta)) = self.store.get_tokens(id) else { continue };
            let block_name = meta.get("name").and_then(|v| v.as_str()).unwrap_or("");
            if block_name == name || block_name.ends_with(&suffix) {
                let line = meta.get("start_line").and_then(|v| v.as_u64()).unwrap_or(0);
                matches.push((id.clone(), block_name.to_string(), line));
            }
        }

        match matches.len() {
            0 => anyhow::bail!("no block named '{name}' found"),
            1 => Ok(matches.remove(0).0),
            _ => {
                let details: Vec<String> = matches
                    .iter()
                    .map(|(_, n, line)| format!("  - line {line}: {n}"))
                    .collect();
                anyhow::bail!(
                    "multiple blocks named '{name}' found:\n{}\nUse file:<line> to pick one.",
                    details.join("\n")
                )
            }
        }
    }

    fn block_by_line(&self, block_ids: &[String], line: usize) -> Option<String> {
        for id in block_ids {
            let (_, meta) = self.store.get_tokens(id)?;
            let start = meta.get("start_line").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let end = meta.get("end_line").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            if start <= line && line <= end {
                return Some(id.clone());
            }
        }
        None
    }
}

/// Merge the hybrid and pure-semantic streams, keeping the higher score
/// (and its metadata) per block id.
fn merge_streams(hybrid: Vec<Hit>, semantic: Vec<Hit>) -> Vec<SearchResult> {
    let mut best: HashMap<String, Hit> = HashMap::new();
    for hit in hybrid.into_iter().chain(semantic) {
        match best.get(&hit.id) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.id.clone(), hit);
            }
        }
    }

    let mut merged: Vec<Hit> = best.into_values().collect();
    // Deterministic pre-boost order regardless of hash iteration.
    merged.sort_by(|a, b| a.id.cmp(&b.id));
    merged.iter().filter_map(hit_to_result).collect()
}

fn hit_to_result(hit: &Hit) -> Option<SearchResult> {
    let meta = &hit.metadata;
    let get_str = |key: &str| meta.get(key).and_then(Value::as_str).map(str::to_string);

    Some(SearchResult {
        file: get_str("file")?,
        kind: meta
            .get("kind")
            .and_then(|v| serde_json::from_value::<BlockKind>(v.clone()).ok())
            .unwrap_or(BlockKind::Other),
        language: meta
            .get("language")
            .and_then(|v| serde_json::from_value::<Language>(v.clone()).ok())
            .unwrap_or(Language::Other),
        name: get_str("name").unwrap_or_default(),
        line: meta.get("start_line").and_then(Value::as_u64).unwrap_or(0) as usize,
        end_line: meta.get("end_line").and_then(Value::as_u64).unwrap_or(0) as usize,
        content: get_str("content"),
        score: hit.score,
    })
}
