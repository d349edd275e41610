//! Chunked extraction for documentation files.
//!
//! Markdown is split structurally: fenced code blocks become their own
//! blocks tagged with the fence language, and the remaining text is chunked
//! by heading sections. Plain text and reStructuredText are chunked without
//! heading structure.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Block, BlockKind, Language};

/// Target chunk size in estimated tokens (~4 chars per token).
const CHUNK_TOKENS: usize = 400;
/// Overlap carried from the previous chunk, in estimated tokens.
const OVERLAP_TOKENS: usize = 50;
/// Chunks below this size are dropped as noise.
const MIN_CHUNK_TOKENS: usize = 30;

/// Sentence boundary: punctuation followed by whitespace.
static SENTENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// Fenced code block opener/closer.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(`{3,}|~{3,})(\w+)?").unwrap());

/// Markdown header line.
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").unwrap());

/// Extract blocks from a documentation file.
pub fn extract(relative_path: &str, language: Language, content: &str) -> Vec<Block> {
    match language {
        Language::Markdown => extract_markdown(relative_path, content),
        _ => extract_plain(relative_path, content),
    }
}

fn estimate_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

/// Split text recursively along paragraph, line, sentence and word
/// boundaries until every piece fits the token budget.
fn split_text(text: &str, budget: usize) -> Vec<String> {
    let separators: Vec<Option<&str>> = vec![Some("\n\n"), Some("\n"), None, Some(" ")];
    split_with_separators(text, budget, &separators)
}

fn split_with_separators(text: &str, budget: usize, separators: &[Option<&str>]) -> Vec<String> {
    if estimate_tokens(text) <= budget {
        return if text.trim().is_empty() {
            vec![]
        } else {
            vec![text.to_string()]
        };
    }

    for (i, sep) in separators.iter().enumerate() {
        let (parts, joiner) = match sep {
            None => {
                let parts: Vec<&str> = SENTENCE_RE
                    .split(text)
                    .filter(|s| !s.trim().is_empty())
                    .collect();
                if parts.len() <= 1 {
                    continue;
                }
                (parts, " ")
            }
            Some(s) => {
                if !text.contains(s) {
                    continue;
                }
                (text.split(s).collect::<Vec<_>>(), *s)
            }
        };

        let mut chunks = Vec::new();
        let mut current = String::new();

        for part in &parts {
            let candidate = if current.is_empty() {
                part.to_string()
            } else {
                format!("{current}{joiner}{part}")
            };

            if estimate_tokens(&candidate) <= budget {
                current = candidate;
            } else {
                if !current.is_empty() {
                    chunks.push(current);
                }
                if estimate_tokens(part) > budget && i + 1 < separators.len() {
                    chunks.extend(split_with_separators(part, budget, &separators[i + 1..]));
                    current = String::new();
                } else {
                    current = part.to_string();
                }
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        if !chunks.is_empty() {
            return chunks;
        }
    }

    // Hard split by words.
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut current_words = Vec::new();
    for word in words {
        current_words.push(word);
        if estimate_tokens(&current_words.join(" ")) >= budget {
            chunks.push(current_words.join(" "));
            current_words.clear();
        }
    }
    if !current_words.is_empty() {
        chunks.push(current_words.join(" "));
    }
    chunks
}

/// Prefix each chunk after the first with the tail of its predecessor.
fn add_overlap(chunks: &[String], overlap_words: usize) -> Vec<String> {
    if chunks.len() <= 1 || overlap_words == 0 {
        return chunks.to_vec();
    }

    let mut result = vec![chunks[0].clone()];
    for i in 1..chunks.len() {
        let prev_words: Vec<&str> = chunks[i - 1].split_whitespace().collect();
        let tail = if prev_words.len() > overlap_words {
            &prev_words[prev_words.len() - overlap_words..]
        } else {
            &prev_words
        };
        result.push(format!("{} {}", tail.join(" "), chunks[i]));
    }
    result
}

struct Section {
    /// Header chain from H1 down to this section's own header.
    headers: Vec<String>,
    content: String,
    /// 1-based.
    start_line: usize,
    end_line: usize,
    /// Fence language for code sections, None for text.
    fence_language: Option<String>,
}

fn parse_markdown(content: &str) -> Vec<Section> {
    let lines: Vec<&str> = content.lines().collect();
    let mut sections = Vec::new();
    let mut headers: Vec<String> = Vec::new();
    let mut text_lines: Vec<&str> = Vec::new();
    let mut text_start = 1usize;
    let mut in_fence = false;
    let mut fence_start = 0usize;
    let mut fence_language: Option<String> = None;
    let mut fence_lines: Vec<&str> = Vec::new();

    let flush_text = |headers: &[String], lines: &[&str], start: usize, end: usize| -> Option<Section> {
        let text = lines.join("\n");
        if text.trim().is_empty() {
            return None;
        }
        Some(Section {
            headers: headers.to_vec(),
            content: text.trim().to_string(),
            start_line: start,
            end_line: end,
            fence_language: None,
        })
    };

    for (i, line) in lines.iter().enumerate() {
        let lineno = i + 1;

        if let Some(caps) = FENCE_RE.captures(line) {
            if !in_fence {
                if let Some(s) = flush_text(&headers, &text_lines, text_start, lineno.saturating_sub(1)) {
                    sections.push(s);
                }
                text_lines.clear();
                in_fence = true;
                fence_start = lineno;
                fence_language = caps.get(2).map(|m| m.as_str().to_string());
                fence_lines.clear();
            } else {
                in_fence = false;
                let code = fence_lines.join("\n");
                if !code.trim().is_empty() {
                    sections.push(Section {
                        headers: headers.clone(),
                        content: code,
                        start_line: fence_start,
                        end_line: lineno,
                        fence_language: Some(
                            fence_language.take().unwrap_or_else(|| "code".to_string()),
                        ),
                    });
                }
                text_start = lineno + 1;
            }
            continue;
        }

        if in_fence {
            fence_lines.push(line);
            continue;
        }

        if let Some(caps) = HEADER_RE.captures(line) {
            if let Some(s) = flush_text(&headers, &text_lines, text_start, lineno.saturating_sub(1)) {
                sections.push(s);
            }
            let level = caps.get(1).unwrap().as_str().len();
            let title = caps.get(2).unwrap().as_str().trim().to_string();
            headers.truncate(level - 1);
            headers.push(title);
            text_lines.clear();
            text_start = lineno;
        } else {
            text_lines.push(line);
        }
    }

    // An unclosed fence is treated as text.
    if in_fence {
        text_lines.extend(fence_lines);
        text_start = fence_start;
    }

    if let Some(s) = flush_text(&headers, &text_lines, text_start, lines.len().max(1)) {
        sections.push(s);
    }

    sections
}

fn extract_markdown(relative_path: &str, content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();

    for section in parse_markdown(content) {
        let chain = section.headers.join(" > ");

        if let Some(lang) = &section.fence_language {
            // Fenced code: one block, tagged with the fence language.
            let name = if chain.is_empty() {
                lang.clone()
            } else {
                format!("{chain} | {lang}")
            };
            blocks.push(Block {
                id: Block::make_id(relative_path, section.start_line, &name),
                relative_path: relative_path.to_string(),
                language: Language::Markdown,
                kind: BlockKind::Other,
                name,
                start_line: section.start_line,
                end_line: section.end_line,
                content: section.content,
            });
            continue;
        }

        let chunks = split_text(&section.content, CHUNK_TOKENS);
        let chunks = add_overlap(&chunks, OVERLAP_TOKENS);
        let name = if chain.is_empty() {
            relative_file_name(relative_path)
        } else {
            chain.clone()
        };

        let mut offset = 0usize;
        for chunk in &chunks {
            if estimate_tokens(chunk) < MIN_CHUNK_TOKENS {
                continue;
            }
            let start = (section.start_line + offset).min(section.end_line);
            let chunk_lines = chunk.matches('\n').count() + 1;
            let end = (start + chunk_lines - 1).min(section.end_line);
            offset += chunk_lines;

            let text = if chain.is_empty() {
                chunk.clone()
            } else {
                format!("{chain} | {chunk}")
            };
            blocks.push(Block {
                id: Block::make_id(relative_path, start, &name),
                relative_path: relative_path.to_string(),
                language: Language::Markdown,
                kind: BlockKind::TextChunk,
                name: name.clone(),
                start_line: start,
                end_line: end,
                content: text,
            });
        }
    }

    blocks
}

fn extract_plain(relative_path: &str, content: &str) -> Vec<Block> {
    let chunks = split_text(content, CHUNK_TOKENS);
    let chunks = add_overlap(&chunks, OVERLAP_TOKENS);
    let name = relative_file_name(relative_path);

    let mut blocks = Vec::new();
    let mut line = 1usize;
    for chunk in &chunks {
        let chunk_lines = chunk.matches('\n').count() + 1;
        if estimate_tokens(chunk) >= MIN_CHUNK_TOKENS {
            blocks.push(Block {
                id: Block::make_id(relative_path, line, &name),
                relative_path: relative_path.to_string(),
                language: Language::Text,
                kind: BlockKind::TextChunk,
                name: name.clone(),
                start_line: line,
                end_line: line + chunk_lines - 1,
                content: chunk.clone(),
            });
        }
        line += chunk_lines;
    }

    blocks
}

fn relative_file_name(relative_path: &str) -> String {
    relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_fences_become_blocks() {
        let md = "# Setup\n\nInstall it:\n\n```bash\ncargo install quarry\n```\n";
        let blocks = extract("README.md", Language::Markdown, md);

        let fence = blocks
            .iter()
            .find(|b| b.kind == BlockKind::Other)
            .expect("fence block");
        assert!(fence.name.contains("bash"));
        assert!(fence.content.contains("cargo install"));
        assert_eq!(fence.start_line, 5);
        assert_eq!(fence.end_line, 7);
    }

    #[test]
    fn section_names_are_header_chains() {
        let body = "word ".repeat(150);
        let md = format!("# Guide\n\n## Install\n\n{body}\n");
        let blocks = extract("doc.md", Language::Markdown, &md);

        let chunk = blocks
            .iter()
            .find(|b| b.kind == BlockKind::TextChunk)
            .expect("text chunk");
        assert_eq!(chunk.name, "Guide > Install");
        assert_eq!(chunk.kind, BlockKind::TextChunk);
    }

    #[test]
    fn tiny_sections_are_dropped() {
        let md = "# A\n\nhi\n";
        let blocks = extract("doc.md", Language::Markdown, md);
        assert!(blocks.is_empty());
    }

    #[test]
    fn long_sections_chunk_with_overlap() {
        // ~1300 estimated tokens of prose -> several chunks.
        let body = (0..650)
            .map(|i| format!("paragraph{i} text"))
            .collect::<Vec<_>>()
            .join(" ");
        let md = format!("# Long\n\n{body}\n");
        let blocks = extract("doc.md", Language::Markdown, &md);

        let chunks: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.kind == BlockKind::TextChunk)
            .collect();
        assert!(chunks.len() >= 2, "expected multiple chunks, got {}", chunks.len());

        // Overlap: the second chunk repeats the tail of the first.
        let first_tail: Vec<&str> = chunks[0]
            .content
            .split_whitespace()
            .rev()
            .take(5)
            .collect();
        for word in first_tail {
            assert!(chunks[1].content.contains(word));
        }
    }

    #[test]
    fn plain_text_chunks() {
        let text = (0..300)
            .map(|i| format!("line {i} of plain prose"))
            .collect::<Vec<_>>()
            .join("\n");
        let blocks = extract("notes.txt", Language::Text, &text);
        assert!(!blocks.is_empty());
        assert!(blocks.iter().all(|b| b.kind == BlockKind::TextChunk));
        assert!(blocks.iter().all(|b| b.language == Language::Text));
        assert_eq!(blocks[0].start_line, 1);
    }

    #[test]
    fn fence_language_defaults_to_code() {
        let md = "```\nplain fence body that is long enough to keep\n```\n";
        let blocks = extract("doc.md", Language::Markdown, md);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "code");
    }
}
