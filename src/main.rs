use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use strata::config::{self, MAX_DEPTH_DEFAULT, MAX_FILES_DEFAULT, Ruleset};
use strata::index::{IndexOptions, run_index};
use strata::query::{
    Filters, HOPS_DEFAULT, HOPS_MAX, MAX_EDGES_DEFAULT, MAX_NODES_DEFAULT, QueryError,
    QueryOptions, render::render_markdown, run_query,
};
use strata::store::{self, StoreError};

const STORE_DIR_DEFAULT: &str = ".strata/kg";

#[derive(Debug)]
struct CliError {
    code: &'static str,
    message: String,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn io(code: &'static str, err: io::Error) -> Self {
        Self::new(code, err.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Missing(_) => Self::new("store_missing", value.to_string()),
            StoreError::Io(_) => Self::new("io_error", value.to_string()),
            StoreError::Json(_) => Self::new("json_error", value.to_string()),
        }
    }
}

impl From<QueryError> for CliError {
    fn from(value: QueryError) -> Self {
        match value {
            QueryError::NoFilters => Self::new("usage_error", value.to_string()),
            QueryError::NoMatch => Self::new("no_match", value.to_string()),
            QueryError::Store(err) => err.into(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::new("json_error", value.to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "A codebase knowledge-graph indexer and context-bundle query engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Index(IndexArgs),
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Repository root to index (default: current directory).
    root: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Reindex everything, ignoring stored content hashes.
    #[arg(long)]
    full: bool,
    /// Restrict enumeration to files changed since this git ref.
    #[arg(long)]
    since_git: Option<String>,
    #[arg(long)]
    max_files: Option<usize>,
    #[arg(long)]
    max_depth: Option<u32>,
    #[arg(long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Store directory (default: ./.strata/kg).
    store_dir: Option<PathBuf>,
    #[arg(long)]
    symbol: Option<String>,
    #[arg(long)]
    path: Option<String>,
    /// Comma-separated tag list.
    #[arg(long)]
    tags: Option<String>,
    /// Comma-separated node type list.
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long, default_value_t = HOPS_DEFAULT)]
    hops: u32,
    #[arg(long, default_value_t = MAX_NODES_DEFAULT)]
    max_nodes: usize,
    #[arg(long, default_value_t = MAX_EDGES_DEFAULT)]
    max_edges: usize,
    #[arg(long, value_parser = ["md", "json"], default_value = "md")]
    format: String,
    #[arg(long)]
    include_evidence: bool,
    /// Print the stored overview instead of running filters.
    #[arg(long)]
    summary: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let payload = json!({
                "error": {
                    "code": err.code,
                    "message": err.message,
                }
            });
            eprintln!("{payload}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Index(args) => cmd_index(args),
        Command::Query(args) => cmd_query(args),
    }
}

fn cmd_index(args: IndexArgs) -> Result<(), CliError> {
    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir().map_err(|err| CliError::io("cwd_error", err))?,
    };
    if !root.is_dir() {
        return Err(CliError::new(
            "invalid_root",
            format!("`{}` is not a directory", root.display()),
        ));
    }

    let mut rules = Ruleset::builtin()
        .map_err(|err| CliError::new("config_error", err.to_string()))?;
    let overlay = config::load_overlay(&root)
        .map_err(|err| CliError::new("config_error", err.to_string()))?;
    let mut max_files = MAX_FILES_DEFAULT;
    let mut max_depth = MAX_DEPTH_DEFAULT as u32;
    if let Some(overlay) = &overlay {
        rules
            .apply_overlay(overlay)
            .map_err(|err| CliError::new("config_error", err.to_string()))?;
        if let Some(files) = overlay.max_files {
            max_files = files;
        }
        if let Some(depth) = overlay.max_depth {
            max_depth = depth as u32;
        }
    }
    // CLI flags win over overlay budgets.
    if let Some(files) = args.max_files {
        max_files = files;
    }
    if let Some(depth) = args.max_depth {
        max_depth = depth;
    }

    let output_dir = args
        .output_dir
        .unwrap_or_else(|| root.join(STORE_DIR_DEFAULT));

    let opts = IndexOptions {
        root,
        output_dir: output_dir.clone(),
        full: args.full,
        since_ref: args.since_git,
        max_files,
        max_depth,
        verbose: args.verbose,
    };
    let report = run_index(&opts, &rules)?;

    print_json(&json!({
        "status": "ok",
        "output_dir": output_dir,
        "files": report.file_count,
        "entry_points": report.entry_point_count,
        "seeds": report.seed_count,
        "symbols": report.symbol_count,
        "nodes": report.node_count,
        "edges": report.edge_count,
        "extractor": report.extractor,
        "elapsed_seconds": report.elapsed_seconds,
    }))
}

fn cmd_query(args: QueryArgs) -> Result<(), CliError> {
    let store_dir = match args.store_dir {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|err| CliError::io("cwd_error", err))?
            .join(STORE_DIR_DEFAULT),
    };

    if args.summary {
        return match store::load_overview(&store_dir) {
            Some(overview) => {
                print!("{overview}");
                Ok(())
            }
            None => Err(CliError::new(
                "store_missing",
                format!("no overview found under `{}`", store_dir.display()),
            )),
        };
    }

    let filters = Filters {
        symbol: args.symbol,
        path: args.path,
        tags: args
            .tags
            .map(|tags| {
                tags.split(',')
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        kind: args.kind,
    };
    // The usage error must not require a store on disk.
    if filters.is_empty() {
        return Err(QueryError::NoFilters.into());
    }

    let store = store::load_store(&store_dir)?;
    let bundle = run_query(
        &store,
        &QueryOptions {
            filters,
            hops: args.hops.min(HOPS_MAX),
            max_nodes: args.max_nodes,
            max_edges: args.max_edges,
        },
    )?;

    if args.format == "json" {
        print_json(&serde_json::to_value(&bundle)?)
    } else {
        print!("{}", render_markdown(&bundle, args.include_evidence));
        Ok(())
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    println!("{value}");
    Ok(())
}
