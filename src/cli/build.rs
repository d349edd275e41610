use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use crate::config::Config;
use crate::index::{BuildOptions, Indexer};

pub fn run(path: &Path, force: bool, quiet: bool, config: &Config) -> Result<()> {
    let indexer = Indexer::create(path, config.clone())?;
    let refreshing = indexer.is_indexed() && !force;
    let t0 = Instant::now();

    let progress = |phase: &str, current: usize, total: usize| {
        if total > 0 {
            eprint!("\r{phase} {current}/{total}...    ");
        } else {
            eprint!("\r{phase}...    ");
        }
    };

    let progress: crate::index::Progress = &progress;
    let opts = BuildOptions {
        force,
        progress: (!quiet).then_some(progress),
        cancel: None,
    };
    let stats = indexer.build(opts)?;

    if !quiet {
        eprint!("\r                                \r");
        let elapsed = t0.elapsed().as_secs_f64();
        if refreshing && stats.blocks == 0 && stats.deleted == 0 {
            eprintln!("Index up to date ({} files)", stats.skipped);
        } else {
            eprintln!(
                "Indexed {} blocks from {} files ({elapsed:.1}s)",
                stats.blocks, stats.files
            );
            if stats.deleted > 0 {
                eprintln!("Removed {} stale blocks", stats.deleted);
            }
            if stats.errors > 0 {
                eprintln!("Skipped {} files with extraction errors", stats.errors);
            }
        }
    }

    Ok(())
}
