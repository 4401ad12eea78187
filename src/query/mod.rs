pub mod bundle;
pub mod render;

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::store::{LoadedStore, StoreError};

pub const HOPS_DEFAULT: u32 = 1;
pub const HOPS_MAX: u32 = 3;
pub const MAX_NODES_DEFAULT: usize = 30;
pub const MAX_EDGES_DEFAULT: usize = 60;

#[derive(Debug)]
pub enum QueryError {
    NoFilters,
    NoMatch,
    Store(StoreError),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFilters => write!(
                f,
                "no filters given; pass --symbol, --path, --tags, or --type (or --summary)"
            ),
            Self::NoMatch => write!(f, "no nodes matched the given filters"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<StoreError> for QueryError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

#[derive(Debug, Default, Clone)]
pub struct Filters {
    pub symbol: Option<String>,
    pub path: Option<String>,
    pub tags: Vec<String>,
    pub kind: Option<String>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.symbol.is_none() && self.path.is_none() && self.tags.is_empty() && self.kind.is_none()
    }

    /// Human-readable echo of the active filters, carried in the bundle.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if let Some(symbol) = &self.symbol {
            let _ = write!(&mut out, "symbol={symbol} ");
        }
        if let Some(path) = &self.path {
            let _ = write!(&mut out, "path={path} ");
        }
        if !self.tags.is_empty() {
            let _ = write!(&mut out, "tags={} ", self.tags.join(","));
        }
        if let Some(kind) = &self.kind {
            let _ = write!(&mut out, "type={kind} ");
        }
        out.trim_end().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub filters: Filters,
    pub hops: u32,
    pub max_nodes: usize,
    pub max_edges: usize,
}

/// Resolve the filters against the store, intersect, and expand the
/// surviving ids into a bounded context bundle.
pub fn run_query(
    store: &LoadedStore,
    opts: &QueryOptions,
) -> Result<bundle::ContextBundle, QueryError> {
    if opts.filters.is_empty() {
        return Err(QueryError::NoFilters);
    }

    let mut candidate_sets: Vec<BTreeSet<String>> = Vec::new();
    if let Some(symbol) = &opts.filters.symbol {
        candidate_sets.push(resolve_symbol(store, symbol));
    }
    if let Some(path) = &opts.filters.path {
        candidate_sets.push(resolve_path(store, path));
    }
    if !opts.filters.tags.is_empty() {
        candidate_sets.push(resolve_tags(store, &opts.filters.tags));
    }
    if let Some(kind) = &opts.filters.kind {
        candidate_sets.push(resolve_kind(store, kind));
    }

    let mut sets = candidate_sets.into_iter();
    let mut matched = sets.next().unwrap_or_default();
    for set in sets {
        matched = matched.intersection(&set).cloned().collect();
    }
    if matched.is_empty() {
        return Err(QueryError::NoMatch);
    }

    let hops = opts.hops.min(HOPS_MAX);
    Ok(bundle::build(
        store,
        &matched,
        opts.filters.describe(),
        hops,
        opts.max_nodes,
        opts.max_edges,
    ))
}

/// Exact hit in the symbol index wins; otherwise fall back to a
/// case-insensitive substring scan over node names.
fn resolve_symbol(store: &LoadedStore, symbol: &str) -> BTreeSet<String> {
    if let Some(ids) = store.symbol_index.get(symbol) {
        return ids.iter().cloned().collect();
    }
    let needle = symbol.to_lowercase();
    store
        .nodes
        .iter()
        .filter(|node| node.name.to_lowercase().contains(&needle))
        .map(|node| node.id.clone())
        .collect()
}

/// Plain substring over the path index first; only the node-path
/// fallback is case-insensitive.
fn resolve_path(store: &LoadedStore, path: &str) -> BTreeSet<String> {
    let from_index: BTreeSet<String> = store
        .path_index
        .iter()
        .filter(|(indexed, _)| indexed.contains(path))
        .map(|(_, id)| id.clone())
        .collect();
    if !from_index.is_empty() {
        return from_index;
    }
    let needle = path.to_lowercase();
    store
        .nodes
        .iter()
        .filter(|node| node.path.to_lowercase().contains(&needle))
        .map(|node| node.id.clone())
        .collect()
}

/// Any overlap between the queried tags and a node's tags matches, both
/// sides lowercased.
fn resolve_tags(store: &LoadedStore, tags: &[String]) -> BTreeSet<String> {
    let wanted: BTreeSet<String> = tags.iter().map(|tag| tag.to_lowercase()).collect();
    store
        .nodes
        .iter()
        .filter(|node| {
            node.tags
                .iter()
                .any(|tag| wanted.contains(&tag.to_lowercase()))
        })
        .map(|node| node.id.clone())
        .collect()
}

/// Comma-separated kind names, each matched case-insensitively and exactly.
fn resolve_kind(store: &LoadedStore, kind: &str) -> BTreeSet<String> {
    let wanted: BTreeSet<String> = kind
        .split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .collect();
    store
        .nodes
        .iter()
        .filter(|node| wanted.contains(node.kind.as_str()))
        .map(|node| node.id.clone())
        .collect()
}
