use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::error::Error;
use crate::index::{locate, Indexer};

pub fn run(path: &Path, config: &Config) -> Result<()> {
    if !locate::index_exists(path) {
        // A parent index may govern this path.
        if let Some(parent) = locate::find_parent_index(path) {
            eprintln!("Covered by the index at {}", parent.display());
            return run(&parent, config);
        }
        return Err(Error::IndexMissing {
            path: path.to_path_buf(),
        }
        .into());
    }

    let indexer = Indexer::create(path, config.clone())?;
    let status = indexer.status()?;

    println!(
        "{} files, {} blocks (schema v{}, model {})",
        status.file_count, status.block_count, status.schema_version, status.model_identity
    );

    if status.changed == 0 && status.removed == 0 {
        println!("Index up to date");
    } else {
        let mut parts = Vec::new();
        if status.changed > 0 {
            parts.push(format!("{} changed", status.changed));
        }
        if status.removed > 0 {
            parts.push(format!("{} removed", status.removed));
        }
        println!("Stale: {} -- run 'quarry build'", parts.join(", "));
    }

    Ok(())
}
