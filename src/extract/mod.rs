//! AST-aware block extraction using tree-sitter.
//!
//! Each supported language has a query capturing its canonical block kinds
//! (see [`queries`]). Documentation files go through chunked extraction in
//! [`prose`]. Files with no recognized structure fall back to a single head
//! block so every file stays findable.

pub mod languages;
pub mod prose;
pub mod queries;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{Context, Result};
use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};

use crate::models::{Block, BlockKind, Language};

/// Lines of fallback content taken from files without recognized structure.
const FALLBACK_HEAD_LINES: usize = 50;

/// A parent block is dropped when its children cover all but this many of
/// its lines (the declaration line plus a docstring, typically).
const DEDUP_RESIDUAL_LINES: usize = 2;

/// Compiled queries are immutable and shared process-wide; parsers are
/// per-extractor because they require mutable access.
static QUERY_TABLE: OnceLock<Mutex<HashMap<Language, Option<Arc<Query>>>>> = OnceLock::new();

fn compiled_query(language: Language) -> Option<Arc<Query>> {
    let table = QUERY_TABLE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
    table
        .entry(language)
        .or_insert_with(|| {
            let grammar = languages::grammar(language)?;
            let source = queries::query_source(language)?;
            match Query::new(&grammar, source) {
                Ok(q) => Some(Arc::new(q)),
                Err(e) => {
                    tracing::warn!("query for {} failed to compile: {e}", language.as_str());
                    None
                }
            }
        })
        .clone()
}

/// Extracts blocks from source files. One instance per worker thread;
/// parsers are cached per language inside the instance.
pub struct Extractor {
    parsers: HashMap<Language, Parser>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Extract all blocks from one file.
    pub fn extract(&mut self, relative_path: &str, content: &str) -> Result<Vec<Block>> {
        let language = Language::from_path(std::path::Path::new(relative_path));

        if language.is_prose() {
            return Ok(uniquify_ids(prose::extract(relative_path, language, content)));
        }

        let Some(query) = compiled_query(language) else {
            return Ok(fallback_head(relative_path, language, content));
        };

        let parser = match self.parsers.entry(language) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let grammar =
                    languages::grammar(language).context("language lost its grammar")?;
                let mut parser = Parser::new();
                parser
                    .set_language(&grammar)
                    .context("failed to configure parser")?;
                e.insert(parser)
            }
        };

        let bytes = content.as_bytes();
        let Some(tree) = parser.parse(bytes, None) else {
            return Ok(fallback_head(relative_path, language, content));
        };

        let lines: Vec<&str> = content.lines().collect();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, tree.root_node(), bytes);

        let mut blocks = Vec::new();
        let mut seen_ranges = std::collections::HashSet::new();

        while let Some(m) = matches.next() {
            for capture in m.captures {
                let node = capture.node;
                let start_line = node.start_position().row + 1;
                let end_line = node.end_position().row + 1;
                if !seen_ranges.insert((start_line, end_line)) {
                    continue;
                }

                let kind = BlockKind::from_capture(query.capture_names()[capture.index as usize]);
                let name = block_name(&node, bytes, kind);
                let slice = line_slice(&lines, start_line, end_line);

                blocks.push(Block {
                    id: Block::make_id(relative_path, start_line, &name),
                    relative_path: relative_path.to_string(),
                    language,
                    kind,
                    name,
                    start_line,
                    end_line,
                    content: slice,
                });
            }
        }

        if blocks.is_empty() {
            return Ok(fallback_head(relative_path, language, content));
        }

        Ok(uniquify_ids(dedup_nested(blocks)))
    }
}

/// Exact source lines `[start, end]`, 1-based inclusive.
fn line_slice(lines: &[&str], start: usize, end: usize) -> String {
    let start = start.saturating_sub(1);
    let end = end.min(lines.len());
    lines[start..end].join("\n")
}

/// Remove redundant nested blocks.
///
/// Two rules, applied to blocks sorted by start line then span:
/// 1. When two blocks of the same kind family share an end line and one
///    contains the other, only the outermost is kept. A decorated
///    definition and the definition inside it otherwise both appear.
/// 2. A non-container parent whose remaining children cover all but at
///    most [`DEDUP_RESIDUAL_LINES`] of its lines is dropped. Container
///    kinds (class, struct, impl, ...) are kept beside their members so
///    queries for the container name keep working.
fn dedup_nested(mut blocks: Vec<Block>) -> Vec<Block> {
    if blocks.len() <= 1 {
        return blocks;
    }

    blocks.sort_by(|a, b| {
        a.start_line
            .cmp(&b.start_line)
            .then(b.end_line.cmp(&a.end_line))
    });

    let n = blocks.len();
    let mut keep = vec![true; n];

    let contains = |a: &Block, b: &Block| {
        a.start_line <= b.start_line
            && b.end_line <= a.end_line
            && (a.start_line, a.end_line) != (b.start_line, b.end_line)
    };
    let same_family = |a: &Block, b: &Block| {
        (a.kind.is_function_like() && b.kind.is_function_like())
            || (a.kind.is_container() && b.kind.is_container())
    };

    // Rule 1: shared end line, keep the outermost.
    for i in 0..n {
        if !keep[i] {
            continue;
        }
        for j in (i + 1)..n {
            if !keep[j] {
                continue;
            }
            if contains(&blocks[i], &blocks[j])
                && blocks[i].end_line == blocks[j].end_line
                && same_family(&blocks[i], &blocks[j])
            {
                keep[j] = false;
            }
        }
    }

    // Rule 2: covered non-container parents.
    for i in 0..n {
        if !keep[i] || blocks[i].kind.is_container() {
            continue;
        }
        let mut covered = vec![false; blocks[i].end_line - blocks[i].start_line + 1];
        let mut has_children = false;
        for (j, other) in blocks.iter().enumerate() {
            if j == i || !keep[j] || !contains(&blocks[i], other) {
                continue;
            }
            has_children = true;
            for line in other.start_line..=other.end_line {
                covered[line - blocks[i].start_line] = true;
            }
        }
        if has_children {
            let residual = covered.iter().filter(|c| !**c).count();
            if residual <= DEDUP_RESIDUAL_LINES {
                keep[i] = false;
            }
        }
    }

    blocks
        .into_iter()
        .zip(keep)
        .filter_map(|(b, k)| k.then_some(b))
        .collect()
}

/// Extract the declared name of a node, synthesizing one for anonymous and
/// impl nodes.
fn block_name(node: &tree_sitter::Node, source: &[u8], kind: BlockKind) -> String {
    if kind == BlockKind::Impl {
        // "impl Type" / "impl Trait for Type"
        if let Some(ty) = node.child_by_field_name("type") {
            if let Ok(text) = ty.utf8_text(source) {
                return format!("impl {text}");
            }
        }
    }

    // Decorated definitions carry the name on the wrapped definition.
    if let Some(inner) = node.child_by_field_name("definition") {
        return block_name(&inner, source, kind);
    }

    if let Some(name) = node.child_by_field_name("name") {
        if let Ok(text) = name.utf8_text(source) {
            return text.to_string();
        }
    }

    const NAME_KINDS: &[&str] = &[
        "identifier",
        "name",
        "field_identifier",
        "type_identifier",
        "property_identifier",
        "constant",
        "word",
    ];

    // Direct children, then one level deeper (declarators, decorated defs).
    for depth in 0..2 {
        for i in 0..node.child_count() {
            let Some(child) = node.child(i) else { continue };
            if depth == 0 {
                if NAME_KINDS.contains(&child.kind()) {
                    if let Ok(text) = child.utf8_text(source) {
                        return text.to_string();
                    }
                }
            } else {
                for j in 0..child.child_count() {
                    let Some(grandchild) = child.child(j) else { continue };
                    if NAME_KINDS.contains(&grandchild.kind()) {
                        if let Ok(text) = grandchild.utf8_text(source) {
                            return text.to_string();
                        }
                    }
                }
            }
        }
    }

    "<anonymous>".to_string()
}

/// First lines of a file with no extractable structure, as a single block.
fn fallback_head(relative_path: &str, language: Language, content: &str) -> Vec<Block> {
    let lines: Vec<&str> = content.lines().take(FALLBACK_HEAD_LINES).collect();
    if lines.iter().all(|l| l.trim().is_empty()) {
        return Vec::new();
    }
    let end_line = lines.len().max(1);
    let name = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_string();

    vec![Block {
        id: Block::make_id(relative_path, 1, &name),
        relative_path: relative_path.to_string(),
        language,
        kind: BlockKind::Other,
        name,
        start_line: 1,
        end_line,
        content: lines.join("\n"),
    }]
}

/// Guarantee id uniqueness within one file by suffixing repeats.
fn uniquify_ids(mut blocks: Vec<Block>) -> Vec<Block> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for block in &mut blocks {
        let count = seen.entry(block.id.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            block.id = format!("{}#{}", block.id, *count);
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(path: &str, content: &str) -> Vec<Block> {
        Extractor::new().extract(path, content).unwrap()
    }

    #[test]
    fn rust_functions_and_types() {
        let source = r#"
pub struct Auth {
    token: String,
}

impl Auth {
    pub fn verify(&self) -> bool {
        !self.token.is_empty()
    }
}

fn main() {
    let auth = Auth { token: String::new() };
    auth.verify();
}
"#;
        let blocks = extract("src/auth.rs", source);

        let strukt = blocks.iter().find(|b| b.kind == BlockKind::Struct).unwrap();
        assert_eq!(strukt.name, "Auth");
        assert_eq!(strukt.start_line, 2);

        let imp = blocks.iter().find(|b| b.kind == BlockKind::Impl).unwrap();
        assert_eq!(imp.name, "impl Auth");

        let verify = blocks.iter().find(|b| b.name == "verify").unwrap();
        assert_eq!(verify.kind, BlockKind::Function);
        assert!(verify.content.contains("is_empty"));

        assert!(blocks.iter().any(|b| b.name == "main"));
    }

    #[test]
    fn python_decorated_method() {
        // class C:        <- line 1
        //     @deco       <- line 2
        //     def m(self): pass   <- line 3
        let source = "class C:\n    @deco\n    def m(self): pass\n";
        let blocks = extract("c.py", source);

        let classes: Vec<&Block> = blocks.iter().filter(|b| b.kind == BlockKind::Class).collect();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].start_line, 1);
        assert_eq!(classes[0].end_line, 3);

        let funcs: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Function)
            .collect();
        assert_eq!(funcs.len(), 1, "inner def must merge into the decorated block");
        assert_eq!(funcs[0].start_line, 2, "block starts at the decorator");
        assert_eq!(funcs[0].end_line, 3);

        assert_ne!(classes[0].content, funcs[0].content);
    }

    #[test]
    fn python_functions() {
        let source = "def authenticate_user(user, pw):\n    return user and pw\n\ndef logout():\n    pass\n";
        let blocks = extract("src/auth.py", source);
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert!(names.contains(&"authenticate_user"));
        assert!(names.contains(&"logout"));
        let auth = blocks.iter().find(|b| b.name == "authenticate_user").unwrap();
        assert_eq!(auth.start_line, 1);
        assert_eq!(auth.id, "src/auth.py:1:authenticate_user");
    }

    #[test]
    fn nested_function_with_large_residual_keeps_both() {
        let source = r#"def outer():
    x = 1
    y = 2
    def inner():
        return 3
    z = 4
    return x + y + z
"#;
        let blocks = extract("f.py", source);
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert!(names.contains(&"outer"));
        assert!(names.contains(&"inner"));
    }

    #[test]
    fn same_end_nesting_keeps_only_the_outer_block() {
        let source = "def outer():\n    def inner():\n        return 1\n";
        let blocks = extract("f.py", source);
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert!(names.contains(&"outer"));
        assert!(!names.contains(&"inner"));
    }

    #[test]
    fn covered_wrapper_with_trailing_line_is_dropped() {
        // outer adds only its declaration line and a trailing pass around
        // inner, so the child replaces it.
        let source = "def outer():\n    def inner():\n        return 1\n    pass\n";
        let blocks = extract("f.py", source);
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert!(names.contains(&"inner"));
        assert!(!names.contains(&"outer"));
    }

    #[test]
    fn class_kept_beside_methods() {
        let source = r#"class UserStore:
    def add(self, user):
        self.users.append(user)

    def remove(self, user):
        self.users.remove(user)
"#;
        let blocks = extract("store.py", source);
        assert!(blocks.iter().any(|b| b.kind == BlockKind::Class && b.name == "UserStore"));
        assert!(blocks.iter().any(|b| b.name == "add"));
        assert!(blocks.iter().any(|b| b.name == "remove"));
    }

    #[test]
    fn typescript_interface_and_class() {
        let source = r#"
interface Config {
    name: string;
}

export class Service {
    process(): string {
        return "done";
    }
}
"#;
        let blocks = extract("svc.ts", source);
        assert!(blocks
            .iter()
            .any(|b| b.kind == BlockKind::Interface && b.name == "Config"));
        assert!(blocks
            .iter()
            .any(|b| b.kind == BlockKind::Class && b.name == "Service"));
        assert!(blocks
            .iter()
            .any(|b| b.kind == BlockKind::Method && b.name == "process"));
    }

    #[test]
    fn go_functions_and_methods() {
        let source = r#"package main

func Connect(url string) error {
    return nil
}

func (s *Server) Handle(req Request) Response {
    return Response{}
}
"#;
        let blocks = extract("server.go", source);
        assert!(blocks
            .iter()
            .any(|b| b.kind == BlockKind::Function && b.name == "Connect"));
        assert!(blocks
            .iter()
            .any(|b| b.kind == BlockKind::Method && b.name == "Handle"));
    }

    #[test]
    fn unknown_language_falls_back_to_head() {
        let content = "SELECT * FROM users;\nSELECT * FROM posts;\n";
        let blocks = extract("schema.sql", content);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Other);
        assert_eq!(blocks[0].name, "schema.sql");
        assert_eq!(blocks[0].start_line, 1);
    }

    #[test]
    fn empty_file_yields_nothing() {
        assert!(extract("empty.sql", "").is_empty());
        assert!(extract("blank.sql", "  \n\n  ").is_empty());
    }

    #[test]
    fn ids_are_unique_within_file() {
        let source = "def f():\n    pass\n\ndef f():\n    pass\n";
        let blocks = extract("dup.py", source);
        let mut ids: Vec<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), blocks.len());
    }

    #[test]
    fn content_is_exact_line_span() {
        let source = "fn one() {\n    1;\n}\n\nfn two() {\n    2;\n}\n";
        let blocks = extract("x.rs", source);
        let one = blocks.iter().find(|b| b.name == "one").unwrap();
        assert_eq!(one.content, "fn one() {\n    1;\n}");
        assert_eq!(one.start_line, 1);
        assert_eq!(one.end_line, 3);
    }

    #[test]
    fn extractor_reuse_across_files() {
        let mut ex = Extractor::new();
        let a = ex.extract("a.rs", "fn a() {}").unwrap();
        let b = ex.extract("b.py", "def b(): pass").unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
