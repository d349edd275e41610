//! Result rendering for the terminal: styled default view, JSON, compact
//! JSON, and unique-file listings.

use std::collections::HashSet;
use std::path::Path;

use console::style;

use crate::models::{OutputFormat, SearchResult};

/// Number of content lines shown under each hit in the default view.
const PREVIEW_LINES: usize = 3;
const PREVIEW_WIDTH: usize = 80;

/// Print results in the requested format. `display_root` turns
/// index-relative paths into ones meaningful from the caller's directory.
pub fn print_results(
    results: &[SearchResult],
    format: OutputFormat,
    show_scores: bool,
    display_root: Option<&Path>,
) {
    let results: Vec<SearchResult> = results
        .iter()
        .map(|r| {
            let mut r = r.clone();
            if let Some(root) = display_root {
                r.file = root.join(&r.file).to_string_lossy().into_owned();
            }
            r
        })
        .collect();

    match format {
        OutputFormat::FilesOnly => print_files_only(&results),
        OutputFormat::Json => print_json(&results, false),
        OutputFormat::Compact => print_json(&results, true),
        OutputFormat::Default => print_default(&results, show_scores),
    }
}

fn print_files_only(results: &[SearchResult]) {
    let mut seen = HashSet::new();
    for r in results {
        if seen.insert(&r.file) {
            println!("{}", r.file);
        }
    }
}

fn print_json(results: &[SearchResult], compact: bool) {
    let value: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            let mut v = serde_json::to_value(r).unwrap_or_default();
            if compact {
                if let Some(obj) = v.as_object_mut() {
                    obj.remove("content");
                }
            }
            v
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
}

fn print_default(results: &[SearchResult], show_scores: bool) {
    for r in results {
        let location = format!(
            "{}:{}",
            style(&r.file).cyan(),
            style(r.line.to_string()).yellow()
        );
        let label = format!(
            "{} {}",
            style(r.kind.as_str()).dim(),
            style(&r.name).bold()
        );

        if show_scores {
            let pct = (r.score.min(1.0) * 100.0) as i32;
            println!("{location} {label} {}", style(format!("({pct}%)")).magenta());
        } else {
            println!("{location} {label}");
        }

        if let Some(content) = &r.content {
            for line in content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .take(PREVIEW_LINES)
            {
                println!("  {}", style(truncate(line, PREVIEW_WIDTH)).dim());
            }
            println!();
        }
    }
}

fn truncate(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        return line.to_string();
    }
    let cut: String = line.chars().take(width.saturating_sub(3)).collect();
    format!("{cut}...")
}
