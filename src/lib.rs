//! # quarry
//!
//! Local semantic code search. A directory of source files is indexed into
//! a persistent store of extracted code blocks; queries return the top-k
//! blocks ranked by a hybrid of lexical and late-interaction semantic
//! scoring with code-aware boosts.
//!
//! ## Pipeline
//!
//! ```text
//! indexing:  walk -> extract (tree-sitter) -> embed (batched) -> store + manifest
//! searching: query -> embed + identifier split
//!                  -> hybrid BM25+MaxSim stream ┐
//!                  -> pure MaxSim stream        ┴-> merge -> boost -> scope filter -> top-k
//! ```
//!
//! ## Module overview
//!
//! - [`config`] - typed configuration, `QUARRY_*` environment overrides
//! - [`models`] - `Block`, `BlockKind`, `Language`, `SearchResult`
//! - [`walk`] - gitignore-aware traversal; full scan and stat-only modes
//! - [`extract`] - tree-sitter block extraction, nested dedup, prose chunking
//! - [`lexical`] - identifier-aware subtoken splitting for BM25 and boosts
//! - [`embed`] - embedding backends (ONNX behind the `onnx` feature, hashing)
//! - [`store`] - persistent multi-vector store: tantivy BM25 + MaxSim/FDE
//! - [`index`] - build/update orchestration, manifest, hierarchy discovery
//! - [`search`] - candidate streams, fusion, scope filter, find-similar
//! - [`boost`] - deterministic post-retrieval reranking heuristics
//! - [`cli`] / [`output`] - command-line front-end and result rendering

pub mod boost;
pub mod cli;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod index;
pub mod lexical;
pub mod models;
pub mod output;
pub mod search;
pub mod store;
pub mod walk;
