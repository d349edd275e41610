//! Identifier-aware lexical tokenizer.
//!
//! The same splitting is applied to document text before BM25 indexing and
//! to queries before lexical candidate retrieval, so term statistics line up
//! on both sides.

use std::sync::LazyLock;

use regex::Regex;

/// Identifier-like token: starts with a letter, at least 2 chars.
static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z][a-zA-Z0-9_]*[a-zA-Z0-9]").unwrap());

/// camelCase boundary (getUserProfile -> get|User|Profile).
static CAMEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());

/// ALLCAPS -> Capitalized boundary (HTTPSConnection -> HTTPS|Connection).
static UPPER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap());

/// Language keywords filtered from split terms. Compared case-insensitively;
/// they add noise to BM25 without discriminative value.
const KEYWORD_STOP_LIST: &[&str] = &[
    // Rust
    "pub", "fn", "let", "mut", "const", "use", "mod", "impl", "self", "crate", "super", "struct",
    "enum", "trait", "type", "where", "async", "await", "move", "ref", "return", "match", "loop",
    "while", "for", "break", "continue", "unsafe", "static", "extern", "dyn", "true", "false",
    // Python
    "def", "class", "import", "from", "pass", "none", "elif", "else", "try", "except", "finally",
    "with", "yield", "lambda", "raise", "assert", "del", "global", "nonlocal", "and", "not",
    // Go
    "func", "var", "package", "defer", "chan", "select", "case", "default", "goto", "range",
    // C-family / JS / Java
    "void", "int", "char", "float", "double", "long", "short", "unsigned", "signed", "bool",
    "string", "null", "nil", "this", "new", "delete", "throw", "catch", "throws", "extends",
    "implements", "interface", "abstract", "final", "override", "virtual", "protected", "private",
    "public", "if", "do", "switch", "export",
];

fn is_stop_word(word: &str) -> bool {
    KEYWORD_STOP_LIST
        .iter()
        .any(|k| k.eq_ignore_ascii_case(word))
}

/// Split a single identifier into its lowercase component parts.
///
/// Handles camelCase, PascalCase, ALLCAPS runs and snake_case. Returns an
/// empty vec when the word has no internal boundaries.
fn split_word(word: &str) -> Vec<String> {
    let has_camel = CAMEL_RE.is_match(word);
    let has_upper = UPPER_RE.is_match(word);
    let has_underscore = word.contains('_');

    if !has_camel && !has_upper && !has_underscore {
        return Vec::new();
    }

    let expanded = UPPER_RE.replace_all(word, "$1 $2");
    let expanded = CAMEL_RE.replace_all(&expanded, "$1 $2");

    let parts: Vec<String> = expanded
        .split(['_', ' '])
        .filter(|s| s.len() >= 2)
        .map(|s| s.to_lowercase())
        .collect();

    if parts.len() > 1 {
        parts
    } else {
        Vec::new()
    }
}

/// Tokenize text into subtokens for lexical retrieval.
///
/// Originals are retained, camelCase/snake_case parts are appended in
/// lowercase, stop-list keywords are dropped, and duplicates are kept so
/// BM25 term frequency remains meaningful.
pub fn subtokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    for raw in text.split(|c: char| c.is_whitespace() || "/\\.,;:(){}[]<>\"'`".contains(c)) {
        if raw.is_empty() {
            continue;
        }
        if is_stop_word(raw) {
            continue;
        }
        tokens.push(raw.to_string());
        for part in split_word(raw) {
            if !is_stop_word(&part) {
                tokens.push(part);
            }
        }
    }

    tokens
}

/// Append identifier-split terms to `text`, preserving the original so
/// exact tokens still match.
///
/// Allows BM25 to match queries like "get user profile" against
/// `getUserProfile`. Split terms repeat once per occurrence of the source
/// identifier.
pub fn split_identifiers(text: &str) -> String {
    let mut extra: Vec<String> = Vec::new();

    for mat in IDENT_RE.find_iter(text) {
        let word = mat.as_str();
        if word.len() < 4 || is_stop_word(word) {
            continue;
        }
        for part in split_word(word) {
            if !is_stop_word(&part) {
                extra.push(part);
            }
        }
    }

    if extra.is_empty() {
        return text.to_string();
    }

    format!("{text} {}", extra.join(" "))
}

/// Deduplicated lowercase terms from text, identifier-split. Used by the
/// boost stage to compare query terms against block names and paths.
pub fn terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    for mat in IDENT_RE.find_iter(text) {
        let word = mat.as_str();
        let parts = split_word(word);
        if parts.is_empty() {
            out.push(word.to_lowercase());
        } else {
            out.push(word.to_lowercase());
            out.extend(parts);
        }
    }

    // Two-letter words the identifier regex skips (db, io, rx).
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.len() == 2 {
            out.push(word.to_lowercase());
        }
    }

    out.sort_unstable();
    out.dedup();
    out
}
