//! Code-aware post-retrieval boosts.
//!
//! Deterministic multiplicative adjustments applied to the fused retrieval
//! score, using only block metadata and the query text. The multipliers
//! are heuristic starting points; tests read them as parameters.

use std::collections::HashSet;

use crate::lexical;
use crate::models::{BlockKind, SearchResult};

/// The query is exactly the block's name.
pub const EXACT_NAME_BOOST: f32 = 2.5;
/// Per overlapping name term of at least [`MIN_TERM_LEN`] chars.
pub const TERM_OVERLAP_BOOST: f32 = 1.3;
/// Query mentions class/struct and the block is a type container.
pub const CLASS_KIND_BOOST: f32 = 1.2;
/// Query mentions function/method and the block is one.
pub const FUNCTION_KIND_BOOST: f32 = 1.3;
/// A query term appears as a path segment of the block's file.
pub const PATH_SEGMENT_BOOST: f32 = 1.15;
/// Ceiling on the combined multiplier.
pub const MAX_BOOST: f32 = 4.0;
/// Minimum term length considered for overlap and path boosts.
pub const MIN_TERM_LEN: usize = 3;

const CLASS_HINTS: &[&str] = &["class", "struct"];
const FUNCTION_HINTS: &[&str] = &["function", "method"];

const CLASS_KINDS: &[BlockKind] = &[
    BlockKind::Class,
    BlockKind::Struct,
    BlockKind::Impl,
    BlockKind::Enum,
    BlockKind::Trait,
];

/// Adjust scores in place. Ordering is left to the caller so the final
/// sort stays in one place.
pub fn apply(results: &mut [SearchResult], query: &str) {
    if results.is_empty() || query.trim().is_empty() {
        return;
    }

    let query_terms: HashSet<String> = lexical::terms(query).into_iter().collect();
    let query_lower = query.trim().to_lowercase();

    let wants_class = CLASS_HINTS.iter().any(|h| query_terms.contains(*h));
    let wants_function = FUNCTION_HINTS.iter().any(|h| query_terms.contains(*h));

    for result in results.iter_mut() {
        let mut boost = 1.0f32;
        let name_lower = result.name.to_lowercase();

        // Name signal: exact match dominates, otherwise count overlapping
        // split terms.
        if !name_lower.is_empty() && query_lower == name_lower && query_terms.contains(&name_lower)
        {
            boost *= EXACT_NAME_BOOST;
        } else {
            let name_terms: HashSet<String> = lexical::terms(&result.name).into_iter().collect();
            let overlap = name_terms
                .intersection(&query_terms)
                .filter(|t| t.len() >= MIN_TERM_LEN)
                .count();
            for _ in 0..overlap {
                boost *= TERM_OVERLAP_BOOST;
            }
        }

        // Kind affinity.
        if wants_class && CLASS_KINDS.contains(&result.kind) {
            boost *= CLASS_KIND_BOOST;
        }
        if wants_function && result.kind.is_function_like() {
            boost *= FUNCTION_KIND_BOOST;
        }

        // Path relevance: a query term naming a path segment.
        if path_matches(&result.file, &query_terms) {
            boost *= PATH_SEGMENT_BOOST;
        }

        result.score *= boost.min(MAX_BOOST);
    }
}

fn path_matches(file: &str, query_terms: &HashSet<String>) -> bool {
    file.split('/').any(|segment| {
        let segment = segment.to_lowercase();
        let stem = segment.rsplit_once('.').map(|(s, _)| s).unwrap_or(&segment);
        query_terms
            .iter()
            .any(|t| t.len() >= MIN_TERM_LEN && (t == &segment || t == stem))
    })
}
