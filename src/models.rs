use std::path::Path;

use serde::{Deserialize, Serialize};

/// Source language of an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Java,
    C,
    Cpp,
    Markdown,
    Text,
    Other,
}

impl Language {
    /// Detect the language from a file path's extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" => Language::Cpp,
            "md" | "mdx" | "markdown" => Language::Markdown,
            "txt" | "rst" => Language::Text,
            _ => Language::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Markdown => "markdown",
            Language::Text => "text",
            Language::Other => "other",
        }
    }

    /// Documentation languages, excluded by `--code-only`.
    pub fn is_prose(&self) -> bool {
        matches!(self, Language::Markdown | Language::Text)
    }
}

/// Syntactic role of an extracted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Trait,
    Impl,
    Interface,
    Module,
    TextChunk,
    Other,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Function => "function",
            BlockKind::Method => "method",
            BlockKind::Class => "class",
            BlockKind::Struct => "struct",
            BlockKind::Enum => "enum",
            BlockKind::Trait => "trait",
            BlockKind::Impl => "impl",
            BlockKind::Interface => "interface",
            BlockKind::Module => "module",
            BlockKind::TextChunk => "text_chunk",
            BlockKind::Other => "other",
        }
    }

    /// Map a tree-sitter query capture name to a kind.
    pub fn from_capture(capture: &str) -> Self {
        match capture {
            "function" => BlockKind::Function,
            "method" => BlockKind::Method,
            "class" => BlockKind::Class,
            "struct" => BlockKind::Struct,
            "enum" => BlockKind::Enum,
            "trait" => BlockKind::Trait,
            "impl" => BlockKind::Impl,
            "interface" => BlockKind::Interface,
            "module" => BlockKind::Module,
            _ => BlockKind::Other,
        }
    }

    /// Container kinds wrap their members and survive nested dedup so
    /// searches for the container name keep working.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            BlockKind::Class
                | BlockKind::Struct
                | BlockKind::Enum
                | BlockKind::Trait
                | BlockKind::Impl
                | BlockKind::Interface
                | BlockKind::Module
        )
    }

    pub fn is_function_like(&self) -> bool {
        matches!(self, BlockKind::Function | BlockKind::Method)
    }
}

/// A contiguous region of a source file extracted as one unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// `"<relative_path>:<start_line>:<name>"`, unique within one index.
    pub id: String,
    /// Path relative to the index root, forward slashes.
    pub relative_path: String,
    pub language: Language,
    pub kind: BlockKind,
    /// Declared identifier, or a synthesized name for prose chunks and
    /// anonymous nodes.
    pub name: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    /// Exact source lines `[start_line, end_line]`.
    pub content: String,
}

impl Block {
    pub fn make_id(relative_path: &str, start_line: usize, name: &str) -> String {
        format!("{relative_path}:{start_line}:{name}")
    }

    /// Text handed to the embedder: kind and name prepended so identifier
    /// queries land even when the body never repeats the name.
    pub fn embedding_text(&self) -> String {
        format!("{} {}\n{}", self.kind.as_str(), self.name, self.content)
    }
}

/// A ranked result returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Relative path in JSON output; rewritten for display by the CLI.
    pub file: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub language: Language,
    pub name: String,
    pub line: usize,
    pub end_line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub score: f32,
}

/// Parsed block reference from a `find_similar` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    /// `file#name`
    ByName { path: String, name: String },
    /// `file:line`
    ByLine { path: String, line: usize },
}

impl FileRef {
    /// Parse a query of the form `file#name` or `file:line`. Returns None
    /// for plain text queries.
    pub fn parse(query: &str) -> Option<Self> {
        if let Some((path, name)) = query.split_once('#') {
            if !path.is_empty() && !name.is_empty() && !name.contains(char::is_whitespace) {
                return Some(FileRef::ByName {
                    path: path.to_string(),
                    name: name.to_string(),
                });
            }
        }
        if let Some((path, line)) = query.rsplit_once(':') {
            if !path.is_empty() && !path.contains(char::is_whitespace) {
                if let Ok(line) = line.parse::<usize>() {
                    return Some(FileRef::ByLine {
                        path: path.to_string(),
                        line,
                    });
                }
            }
        }
        None
    }

    pub fn path(&self) -> &str {
        match self {
            FileRef::ByName { path, .. } | FileRef::ByLine { path, .. } => path,
        }
    }
}

/// Output format for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Styled terminal output with a content preview.
    Default,
    Json,
    /// JSON without `content`.
    Compact,
    /// Unique file paths only.
    FilesOnly,
}

/// Counters accumulated by build and update operations.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub files: usize,
    pub blocks: usize,
    pub skipped: usize,
    pub errors: usize,
    pub deleted: usize,
}

impl IndexStats {
    /// One-line summary for logs: "indexed 801 blocks, skipped 2 files".
    pub fn summary(&self) -> String {
        let mut s = format!("indexed {} blocks from {} files", self.blocks, self.files);
        if self.errors > 0 {
            s.push_str(&format!(", skipped {} files", self.errors));
        }
        if self.deleted > 0 {
            s.push_str(&format!(", removed {} stale blocks", self.deleted));
        }
        s
    }
}

pub const EXIT_MATCH: i32 = 0;
pub const EXIT_NO_MATCH: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_detection() {
        assert_eq!(Language::from_path(Path::new("src/main.rs")), Language::Rust);
        assert_eq!(Language::from_path(Path::new("app.py")), Language::Python);
        assert_eq!(Language::from_path(Path::new("a/b.tsx")), Language::Tsx);
        assert_eq!(Language::from_path(Path::new("README.md")), Language::Markdown);
        assert_eq!(Language::from_path(Path::new("notes.txt")), Language::Text);
        assert_eq!(Language::from_path(Path::new("data.csv")), Language::Other);
    }

    #[test]
    fn block_id_is_stable() {
        let id = Block::make_id("src/auth.py", 42, "authenticate_user");
        assert_eq!(id, "src/auth.py:42:authenticate_user");
    }

    #[test]
    fn embedding_text_prepends_kind_and_name() {
        let block = Block {
            id: "f.rs:1:go".into(),
            relative_path: "f.rs".into(),
            language: Language::Rust,
            kind: BlockKind::Function,
            name: "go".into(),
            start_line: 1,
            end_line: 1,
            content: "fn go() {}".into(),
        };
        assert_eq!(block.embedding_text(), "function go\nfn go() {}");
    }

    #[test]
    fn file_ref_by_name() {
        assert_eq!(
            FileRef::parse("src/auth.py#login"),
            Some(FileRef::ByName {
                path: "src/auth.py".into(),
                name: "login".into()
            })
        );
    }

    #[test]
    fn file_ref_by_line() {
        assert_eq!(
            FileRef::parse("src/auth.py:15"),
            Some(FileRef::ByLine {
                path: "src/auth.py".into(),
                line: 15
            })
        );
    }

    #[test]
    fn plain_queries_are_not_file_refs() {
        assert_eq!(FileRef::parse("error handling"), None);
        assert_eq!(FileRef::parse("retry with backoff"), None);
    }

    #[test]
    fn prose_languages() {
        assert!(Language::Markdown.is_prose());
        assert!(Language::Text.is_prose());
        assert!(!Language::Rust.is_prose());
    }

    #[test]
    fn stats_summary_mentions_skips() {
        let stats = IndexStats {
            files: 10,
            blocks: 801,
            errors: 2,
            ..Default::default()
        };
        assert!(stats.summary().contains("801 blocks"));
        assert!(stats.summary().contains("skipped 2 files"));
    }
}
