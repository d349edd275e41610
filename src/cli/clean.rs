use std::path::Path;

use anyhow::Result;

use crate::config::{Config, INDEX_DIR};
use crate::index::{locate, Indexer};

pub fn run(path: &Path, recursive: bool, config: &Config) -> Result<()> {
    let mut deleted = 0usize;

    if locate::index_exists(path) {
        let indexer = Indexer::create(path, config.clone())?;
        indexer.clear()?;
        println!("Deleted {}", path.join(INDEX_DIR).display());
        deleted += 1;
    } else if let Some(parent) = locate::find_parent_index(path) {
        // Below a parent index: remove only this subtree's blocks.
        let indexer = Indexer::create(&parent, config.clone())?;
        let prefix = indexer.to_relative(path);
        if prefix.is_empty() || prefix == "." {
            eprintln!("Use 'quarry clean {}' to delete the parent index", parent.display());
        } else {
            let stats = indexer.remove_prefix(&prefix)?;
            if stats.blocks > 0 {
                println!(
                    "Removed {} blocks ({} files) from the index at {}",
                    stats.blocks,
                    stats.files,
                    parent.display()
                );
                deleted += 1;
            } else {
                eprintln!("No blocks under {prefix} in the parent index");
            }
        }
    }

    if recursive {
        for sub_root in locate::find_subordinate_indexes(path, false) {
            let sub_dir = sub_root.join(INDEX_DIR);
            match std::fs::remove_dir_all(&sub_dir) {
                Ok(()) => {
                    println!("Deleted {}", sub_dir.display());
                    deleted += 1;
                }
                Err(e) => eprintln!("Failed to delete {}: {e}", sub_dir.display()),
            }
        }
    }

    if deleted == 0 {
        eprintln!("No indexes to delete");
    }
    Ok(())
}
