//! Persistent multi-vector store with hybrid retrieval.
//!
//! Each record keys a token matrix, the lexical text, and an opaque
//! metadata payload by block id. Retrieval comes in two shapes:
//!
//! - [`VectorStore::search_multi_with_text`]: BM25 candidates (tantivy)
//!   unioned with an FDE shortlist, reranked with exact MaxSim and fused
//!   into one score.
//! - [`VectorStore::query_with_options`]: pure MaxSim. Exact brute force
//!   below [`EXACT_SEARCH_THRESHOLD`] records, FDE shortlist + rerank
//!   above it.
//!
//! Token matrices live in a JSON sidecar written via temp-file + rename on
//! [`VectorStore::flush`]; the lexical index is tantivy-owned. Deletes are
//! tombstones until [`VectorStore::compact`].

pub mod bm25;
pub mod maxsim;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use self::bm25::Bm25Index;

/// Collections below this size are scored exactly; larger ones go through
/// the FDE shortlist first.
pub const EXACT_SEARCH_THRESHOLD: usize = 5_000;

/// Shortlist width multiplier for approximate search.
const SHORTLIST_FACTOR: usize = 8;

/// Fusion weights for `search_multi_with_text`. MaxSim carries the
/// ranking; BM25 breaks ties toward exact lexical matches.
const MAXSIM_WEIGHT: f32 = 0.7;
const BM25_WEIGHT: f32 = 0.3;

const RECORDS_FILE: &str = "records.json";
const BM25_DIR: &str = "bm25";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    id: String,
    tokens: Vec<Vec<f32>>,
    text: String,
    metadata: Value,
    /// Mean-pooled summary vector for shortlisting.
    summary: Vec<f32>,
    #[serde(default)]
    deleted: bool,
}

/// A scored retrieval hit.
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub score: f32,
    pub metadata: Value,
}

/// Options for pure-semantic queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Force exact scoring regardless of collection size.
    pub exact: bool,
}

#[derive(Serialize, Deserialize, Default)]
struct Sidecar {
    dim: usize,
    records: Vec<Record>,
}

pub struct VectorStore {
    path: PathBuf,
    dim: usize,
    records: RwLock<Vec<Record>>,
    by_id: RwLock<HashMap<String, usize>>,
    bm25: Bm25Index,
}

impl VectorStore {
    /// Open or create a store at `path` for token vectors of width `dim`.
    pub fn open(path: &Path, dim: usize) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create store dir {}", path.display()))?;

        let sidecar_path = path.join(RECORDS_FILE);
        let sidecar: Sidecar = if sidecar_path.exists() {
            let data = std::fs::read_to_string(&sidecar_path)
                .with_context(|| format!("failed to read {}", sidecar_path.display()))?;
            serde_json::from_str(&data).context("store sidecar is corrupt")?
        } else {
            Sidecar {
                dim,
                records: Vec::new(),
            }
        };

        if sidecar.dim != dim {
            anyhow::bail!(
                "store at {} has dimension {}, expected {dim}",
                path.display(),
                sidecar.dim
            );
        }

        let by_id = sidecar
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.deleted)
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        let bm25 = Bm25Index::open_or_create(&path.join(BM25_DIR))?;

        Ok(Self {
            path: path.to_path_buf(),
            dim,
            records: RwLock::new(sidecar.records),
            by_id: RwLock::new(by_id),
            bm25,
        })
    }

    /// Insert or replace a record.
    pub fn store(&self, id: &str, tokens: Vec<Vec<f32>>, text: &str, metadata: Value) -> Result<()> {
        if tokens.iter().any(|t| t.len() != self.dim) {
            anyhow::bail!("token vector width does not match store dimension {}", self.dim);
        }

        let summary = maxsim::fde(&tokens, self.dim);
        let record = Record {
            id: id.to_string(),
            tokens,
            text: text.to_string(),
            metadata,
            summary,
            deleted: false,
        };

        self.bm25.add(id, text)?;

        let mut records = self.records.write();
        let mut by_id = self.by_id.write();
        if let Some(&idx) = by_id.get(id) {
            records[idx] = record;
        } else {
            by_id.insert(id.to_string(), records.len());
            records.push(record);
        }
        Ok(())
    }

    /// Tombstone a record. Unknown ids are ignored.
    pub fn delete(&self, id: &str) {
        let mut records = self.records.write();
        let mut by_id = self.by_id.write();
        if let Some(idx) = by_id.remove(id) {
            records[idx].deleted = true;
            self.bm25.delete(id);
        }
    }

    /// Live record count.
    pub fn count(&self) -> usize {
        self.by_id.read().len()
    }

    /// Tombstoned record count.
    pub fn deleted_count(&self) -> usize {
        self.records.read().iter().filter(|r| r.deleted).count()
    }

    /// Token matrix and metadata for one id.
    pub fn get_tokens(&self, id: &str) -> Option<(Vec<Vec<f32>>, Value)> {
        let records = self.records.read();
        let by_id = self.by_id.read();
        by_id
            .get(id)
            .map(|&idx| (records[idx].tokens.clone(), records[idx].metadata.clone()))
    }

    /// Persist the sidecar and commit the lexical index.
    pub fn flush(&self) -> Result<()> {
        self.bm25.commit()?;

        let records = self.records.read();
        let sidecar = Sidecar {
            dim: self.dim,
            records: records.clone(),
        };
        let data = serde_json::to_string(&sidecar).context("failed to serialize store")?;
        drop(records);

        let target = self.path.join(RECORDS_FILE);
        let tmp = self.path.join(format!("{RECORDS_FILE}.tmp"));
        std::fs::write(&tmp, data)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &target)
            .with_context(|| format!("failed to replace {}", target.display()))?;
        Ok(())
    }

    /// Drop tombstones and rewrite the sidecar.
    pub fn compact(&self) -> Result<()> {
        {
            let mut records = self.records.write();
            let mut by_id = self.by_id.write();
            records.retain(|r| !r.deleted);
            by_id.clear();
            for (i, r) in records.iter().enumerate() {
                by_id.insert(r.id.clone(), i);
            }
        }
        self.flush()
    }

    /// Copy every live record from another store, re-keying ids and the
    /// metadata `file` field under `prefix`. Token vectors move as-is; no
    /// re-embedding happens. Used when a parent index absorbs a
    /// subordinate one.
    pub fn merge_from(&self, other: &VectorStore, prefix: &str) -> Result<usize> {
        if other.dim != self.dim {
            anyhow::bail!(
                "cannot merge store of dimension {} into {}",
                other.dim,
                self.dim
            );
        }

        let source = other.records.read();
        let mut copied = 0usize;
        for record in source.iter().filter(|r| !r.deleted) {
            let new_id = format!("{prefix}/{}", record.id);
            let mut metadata = record.metadata.clone();
            if let Some(obj) = metadata.as_object_mut() {
                if let Some(file) = obj.get("file").and_then(|v| v.as_str()) {
                    let new_file = format!("{prefix}/{file}");
                    obj.insert("file".to_string(), Value::String(new_file));
                }
            }
            self.store(&new_id, record.tokens.clone(), &record.text, metadata)?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Hybrid retrieval: BM25 candidates fused with MaxSim reranking.
    pub fn search_multi_with_text(
        &self,
        query_tokens: &[Vec<f32>],
        query_text: &str,
        k: usize,
        filter: Option<&dyn Fn(&Value) -> bool>,
    ) -> Result<Vec<Hit>> {
        if k == 0 || self.count() == 0 {
            return Ok(Vec::new());
        }

        let bm25_hits = self.bm25.search(query_text, k * 4)?;
        let bm25_scores: HashMap<&str, f32> = bm25_hits
            .iter()
            .map(|(id, score)| (id.as_str(), *score))
            .collect();

        let records = self.records.read();
        let by_id = self.by_id.read();

        // Candidates: BM25 hits plus the semantic shortlist, deduplicated.
        let mut candidates: Vec<usize> = bm25_hits
            .iter()
            .filter_map(|(id, _)| by_id.get(id.as_str()).copied())
            .collect();
        candidates.extend(self.shortlist(&records, query_tokens, k * 4));
        candidates.sort_unstable();
        candidates.dedup();

        let max_bm25 = bm25_hits
            .iter()
            .map(|(_, s)| *s)
            .fold(0.0f32, f32::max)
            .max(f32::EPSILON);

        let mut hits: Vec<Hit> = Vec::with_capacity(candidates.len());
        for idx in candidates {
            let record = &records[idx];
            if record.deleted {
                continue;
            }
            if let Some(f) = filter {
                if !f(&record.metadata) {
                    continue;
                }
            }
            let semantic = maxsim::maxsim_normalized(query_tokens, &record.tokens);
            let lexical = bm25_scores
                .get(record.id.as_str())
                .map(|s| s / max_bm25)
                .unwrap_or(0.0);
            hits.push(Hit {
                id: record.id.clone(),
                score: MAXSIM_WEIGHT * semantic + BM25_WEIGHT * lexical,
                metadata: record.metadata.clone(),
            });
        }

        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    /// Pure-semantic MaxSim retrieval.
    pub fn query_with_options(
        &self,
        query_tokens: &[Vec<f32>],
        k: usize,
        options: QueryOptions,
    ) -> Result<Vec<Hit>> {
        if k == 0 || self.count() == 0 {
            return Ok(Vec::new());
        }

        let records = self.records.read();

        let candidates: Vec<usize> = if options.exact || self.count() <= EXACT_SEARCH_THRESHOLD {
            (0..records.len()).filter(|&i| !records[i].deleted).collect()
        } else {
            self.shortlist(&records, query_tokens, k * SHORTLIST_FACTOR)
        };

        let mut hits: Vec<Hit> = candidates
            .into_iter()
            .map(|idx| {
                let record = &records[idx];
                Hit {
                    id: record.id.clone(),
                    score: maxsim::maxsim_normalized(query_tokens, &record.tokens),
                    metadata: record.metadata.clone(),
                }
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    /// Indices of the `width` records whose FDE is closest to the query's.
    fn shortlist(&self, records: &[Record], query_tokens: &[Vec<f32>], width: usize) -> Vec<usize> {
        let query_fde = maxsim::fde(query_tokens, self.dim);
        let mut scored: Vec<(f32, usize)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.deleted)
            .map(|(i, r)| (maxsim::dot(&query_fde, &r.summary), i))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(width);
        scored.into_iter().map(|(_, i)| i).collect()
    }
}

/// Stable descending sort; ties keep insertion order so results are
/// deterministic across runs.
fn sort_hits(hits: &mut [Hit]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}
