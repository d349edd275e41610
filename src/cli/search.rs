use anyhow::Result;

use crate::cli::Cli;
use crate::config::Config;
use crate::models::{FileRef, OutputFormat, EXIT_MATCH, EXIT_NO_MATCH};
use crate::output;
use crate::search::Searcher;

/// Run a search (or find-similar) and return the process exit code:
/// 0 with results, 1 without.
pub fn run(cli: &Cli, config: &Config) -> Result<i32> {
    let Some(query) = cli.query() else {
        anyhow::bail!("missing query. Usage: quarry <query> [path]");
    };

    let searcher = Searcher::open(cli.path(), config)?;
    let opts = cli.search_options();

    // `file#name` and `file:line` switch to similarity search, but only
    // when the file actually exists; a colon inside a text query is fine.
    let file_ref = FileRef::parse(query).filter(|r| {
        let p = std::path::Path::new(r.path());
        p.exists() || searcher.root().join(r.path()).exists()
    });

    let results = match &file_ref {
        Some(r) => searcher.find_similar(r, &opts)?,
        None => searcher.search(query, &opts)?,
    };

    if results.is_empty() {
        if !cli.quiet() {
            eprintln!("No results");
        }
        return Ok(EXIT_NO_MATCH);
    }

    let format = cli.output_format();
    // Default view shows absolute-ish paths; JSON keeps index-relative.
    let display_root = match format {
        OutputFormat::Default => Some(searcher.root()),
        _ => None,
    };
    output::print_results(&results, format, true, display_root);

    Ok(EXIT_MATCH)
}
