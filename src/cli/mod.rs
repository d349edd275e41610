//! Command-line surface. The core takes typed configuration; this module
//! only parses arguments, dispatches, and maps errors onto exit codes.

mod build;
mod clean;
mod list;
mod search;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::Error;
use crate::models::EXIT_ERROR;

#[derive(Parser)]
#[command(name = "quarry", about = "Local semantic code search", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Search query, or a block reference (file#name, file:line).
    #[arg(value_name = "QUERY")]
    query: Option<String>,

    /// Directory to search.
    #[arg(value_name = "PATH", default_value = ".")]
    path: PathBuf,

    /// Number of results.
    #[arg(short = 'n', long = "n", default_value = "10")]
    num_results: usize,

    /// Minimum score (0 disables).
    #[arg(long = "threshold", default_value = "0.0")]
    threshold: f32,

    /// JSON output.
    #[arg(long = "json")]
    json: bool,

    /// JSON output without content.
    #[arg(long = "compact")]
    compact: bool,

    /// Unique file paths only.
    #[arg(short = 'l', long = "files-only")]
    files_only: bool,

    /// Filter by extension (comma separated: py,rs,ts).
    #[arg(short = 't', long = "type")]
    extensions: Option<String>,

    /// Exclude glob patterns.
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Skip markdown and plain-text results.
    #[arg(long = "code-only")]
    code_only: bool,

    /// Suppress progress output.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build or refresh an index.
    Build {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Discard the existing index and rebuild from scratch.
        #[arg(short = 'f', long = "force")]
        force: bool,
        #[arg(short = 'q', long = "quiet")]
        quiet: bool,
    },
    /// Show index status.
    Status {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Delete an index, or a subtree of a parent index.
    Clean {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Also delete indexes in subdirectories.
        #[arg(short = 'r', long = "recursive")]
        recursive: bool,
    },
    /// List indexes at or below a directory.
    List {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

/// Parse arguments, run, and return the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    let config = Config::from_env();

    let result = match &cli.command {
        Some(Command::Build { path, force, quiet }) => build::run(path, *force, *quiet, &config),
        Some(Command::Status { path }) => status::run(path, &config),
        Some(Command::Clean { path, recursive }) => clean::run(path, *recursive, &config),
        Some(Command::List { path }) => list::run(path, &config),
        None => {
            return match search::run(&cli, &config) {
                Ok(code) => code,
                Err(e) => report(e),
            }
        }
    };

    match result {
        Ok(()) => 0,
        Err(e) => report(e),
    }
}

fn report(e: anyhow::Error) -> i32 {
    eprintln!("{e}");
    match e.downcast_ref::<Error>() {
        Some(err) => err.exit_code(),
        None => EXIT_ERROR,
    }
}

impl Cli {
    pub(crate) fn search_options(&self) -> crate::search::SearchOptions {
        crate::search::SearchOptions {
            k: self.num_results,
            threshold: self.threshold,
            extensions: self
                .extensions
                .as_deref()
                .map(|s| {
                    s.split(',')
                        .map(|e| e.trim().to_string())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            exclude: self.exclude.clone(),
            code_only: self.code_only,
        }
    }

    pub(crate) fn output_format(&self) -> crate::models::OutputFormat {
        use crate::models::OutputFormat;
        if self.files_only {
            OutputFormat::FilesOnly
        } else if self.compact {
            OutputFormat::Compact
        } else if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Default
        }
    }

    pub(crate) fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub(crate) fn path(&self) -> &PathBuf {
        &self.path
    }

    pub(crate) fn quiet(&self) -> bool {
        self.quiet
    }
}
