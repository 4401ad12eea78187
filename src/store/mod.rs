pub mod atomic;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::graph::{Edge, FileRecord, GraphStore, Node};

use atomic::write_atomic;

pub const NODES_FILE: &str = "nodes.jsonl";
pub const EDGES_FILE: &str = "edges.jsonl";
pub const FILES_FILE: &str = "files.jsonl";
pub const SYMBOL_INDEX_FILE: &str = "symbol_to_node.json";
pub const PATH_INDEX_FILE: &str = "path_to_file.json";
pub const META_FILE: &str = "meta.json";
pub const OVERVIEW_FILE: &str = "KG.md";

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Json(serde_json::Error),
    Missing(PathBuf),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
            Self::Missing(path) => write!(f, "store not found at `{}`", path.display()),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub root: String,
    pub indexed_at: String,
    pub file_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub elapsed_seconds: f64,
}

/// Persist one run as an append-once batch: three JSONL collections, two
/// whole-document indexes, run metadata, and the generated overview.
pub fn write_store(
    dir: &Path,
    graph: &GraphStore,
    symbol_index: &BTreeMap<String, Vec<String>>,
    path_index: &BTreeMap<String, String>,
    meta: &RunMeta,
    overview: &str,
) -> Result<(), StoreError> {
    write_atomic(&dir.join(NODES_FILE), &jsonl_bytes(graph.nodes())?)?;
    write_atomic(&dir.join(EDGES_FILE), &jsonl_bytes(graph.edges())?)?;
    write_atomic(&dir.join(FILES_FILE), &jsonl_bytes(graph.files())?)?;
    write_atomic(
        &dir.join(SYMBOL_INDEX_FILE),
        &serde_json::to_vec_pretty(symbol_index)?,
    )?;
    write_atomic(
        &dir.join(PATH_INDEX_FILE),
        &serde_json::to_vec_pretty(path_index)?,
    )?;
    write_atomic(&dir.join(META_FILE), &serde_json::to_vec_pretty(meta)?)?;
    write_atomic(&dir.join(OVERVIEW_FILE), overview.as_bytes())?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct LoadedStore {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub files: Vec<FileRecord>,
    pub symbol_index: BTreeMap<String, Vec<String>>,
    pub path_index: BTreeMap<String, String>,
}

/// Read-only load for the query engine. Corrupt JSONL lines are skipped
/// individually; an unreadable index document degrades to empty (the
/// substring fallbacks still work off the node list).
pub fn load_store(dir: &Path) -> Result<LoadedStore, StoreError> {
    if !dir.is_dir() {
        return Err(StoreError::Missing(dir.to_path_buf()));
    }
    Ok(LoadedStore {
        nodes: read_jsonl(&dir.join(NODES_FILE)),
        edges: read_jsonl(&dir.join(EDGES_FILE)),
        files: read_jsonl(&dir.join(FILES_FILE)),
        symbol_index: read_json_document(&dir.join(SYMBOL_INDEX_FILE)),
        path_index: read_json_document(&dir.join(PATH_INDEX_FILE)),
    })
}

/// Previous-run file records, keyed later by path for the hash-based skip
/// decision. Absent or unreadable store means everything looks new.
pub fn load_file_records(dir: &Path) -> Vec<FileRecord> {
    read_jsonl(&dir.join(FILES_FILE))
}

pub fn load_overview(dir: &Path) -> Option<String> {
    fs::read_to_string(dir.join(OVERVIEW_FILE)).ok()
}

fn jsonl_bytes<T: Serialize>(items: &[T]) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    for item in items {
        out.extend_from_slice(&serde_json::to_vec(item)?);
        out.push(b'\n');
    }
    Ok(out)
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

fn read_json_document<T: DeserializeOwned + Default>(path: &Path) -> T {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}
