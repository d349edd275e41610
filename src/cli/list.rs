use std::path::Path;

use anyhow::Result;

use crate::config::{Config, INDEX_DIR};
use crate::index::{locate, Indexer};

pub fn run(path: &Path, config: &Config) -> Result<()> {
    let roots = locate::find_subordinate_indexes(path, true);

    if roots.is_empty() {
        eprintln!("No indexes found");
        return Ok(());
    }

    let base = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    for root in &roots {
        let display = match root.strip_prefix(&base) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => format!("./{}", rel.display()),
            Err(_) => root.display().to_string(),
        };

        let summary = Indexer::create(root, config.clone())
            .and_then(|indexer| indexer.load_manifest())
            .map(|m| format!("{} blocks", m.block_count()));
        match summary {
            Ok(s) => println!("  {display}/{INDEX_DIR}/ ({s})"),
            Err(_) => println!("  {display}/{INDEX_DIR}/ (needs rebuild)"),
        }
    }

    Ok(())
}
