use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

pub const EDGE_IMPORTS: &str = "imports";
pub const EDGE_DEFINES: &str = "defines";
pub const EDGE_CALLS: &str = "calls";

pub const IMPORT_EDGE_WEIGHT: f32 = 0.7;
pub const DEFINES_EDGE_WEIGHT: f32 = 0.9;
pub const CALL_EDGE_WEIGHT: f32 = 0.5;
pub const FILE_NODE_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Module,
    Package,
    Class,
    Type,
    Function,
    Method,
    Endpoint,
    Config,
    Datastore,
    Event,
    Job,
    Test,
    BuildTarget,
    ExternalService,
    Doc,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Module => "module",
            Self::Package => "package",
            Self::Class => "class",
            Self::Type => "type",
            Self::Function => "function",
            Self::Method => "method",
            Self::Endpoint => "endpoint",
            Self::Config => "config",
            Self::Datastore => "datastore",
            Self::Event => "event",
            Self::Job => "job",
            Self::Test => "test",
            Self::BuildTarget => "build_target",
            Self::ExternalService => "external_service",
            Self::Doc => "doc",
        }
    }

    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Module => "mod",
            Self::Package => "pkg",
            Self::Class => "cls",
            Self::Type => "type",
            Self::Function => "fn",
            Self::Method => "meth",
            Self::Endpoint => "endpoint",
            Self::Config => "config",
            Self::Datastore => "ds",
            Self::Event => "event",
            Self::Job => "job",
            Self::Test => "test",
            Self::BuildTarget => "build",
            Self::ExternalService => "ext",
            Self::Doc => "doc",
        }
    }

    pub fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }

    pub fn is_classlike(self) -> bool {
        matches!(self, Self::Class | Self::Type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl Evidence {
    pub fn line(path: &str, line: u32) -> Self {
        Self {
            path: path.to_string(),
            start_line: line,
            end_line: line,
        }
    }

    pub fn span(path: &str, start_line: u32, end_line: u32) -> Self {
        Self {
            path: path.to_string(),
            start_line,
            end_line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    pub path: String,
    pub lang: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub confidence: f32,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    pub weight: f32,
}

impl Edge {
    pub fn key(&self) -> (String, String, String) {
        (self.source.clone(), self.target.clone(), self.kind.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub hash: String,
    pub lang: String,
    pub loc: u64,
    pub last_indexed: String,
}

/// Stable node id: a pure function of (kind, path, name).
pub fn node_id(kind: NodeKind, path: &str, name: &str) -> String {
    if name.is_empty() {
        format!("{}:{path}", kind.id_prefix())
    } else {
        format!("{}:{path}:{name}", kind.id_prefix())
    }
}

/// Synthetic target id for an import reference; keyed by the literal
/// imported identifier, never resolved to a real file.
pub fn import_node_id(target: &str) -> String {
    format!("import:{target}")
}

/// In-memory node/edge/file collections with per-run dedup sets.
/// Nodes are first-writer-wins by id; edges are unique by
/// (source, target, type) and a duplicate's evidence is dropped.
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    files: Vec<FileRecord>,
    node_positions: HashMap<String, usize>,
    edge_keys: HashSet<(String, String, String)>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> bool {
        if self.node_positions.contains_key(&node.id) {
            return false;
        }
        self.node_positions.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    pub fn add_edge(&mut self, edge: Edge) -> bool {
        let key = edge.key();
        if self.edge_keys.contains(&key) {
            return false;
        }
        self.edge_keys.insert(key);
        self.edges.push(edge);
        true
    }

    pub fn add_file(&mut self, record: FileRecord) {
        self.files.push(record);
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_positions.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_positions.get(id).map(|idx| &self.nodes[*idx])
    }

    /// The single in-run mutation exception: a post-pass tag applied to a
    /// file node once all of its symbols are known.
    pub fn tag_node(&mut self, id: &str, tag: &str) -> bool {
        let Some(idx) = self.node_positions.get(id).copied() else {
            return false;
        };
        let node = &mut self.nodes[idx];
        if node.tags.iter().any(|existing| existing == tag) {
            return false;
        }
        node.tags.push(tag.to_string());
        true
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// Derived lookup indexes, built after both passes: symbol name to
    /// node-id list (file nodes excluded; a name may map to several ids)
    /// and file path to file-node id (1:1).
    pub fn build_indexes(&self) -> (BTreeMap<String, Vec<String>>, BTreeMap<String, String>) {
        let mut symbol_to_node: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut path_to_file: BTreeMap<String, String> = BTreeMap::new();
        for node in &self.nodes {
            if node.kind == NodeKind::File {
                path_to_file.insert(node.path.clone(), node.id.clone());
            } else {
                symbol_to_node
                    .entry(node.name.clone())
                    .or_default()
                    .push(node.id.clone());
            }
        }
        (symbol_to_node, path_to_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_node(path: &str) -> Node {
        Node {
            id: node_id(NodeKind::File, path, ""),
            kind: NodeKind::File,
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            lang: "rust".to_string(),
            summary: String::new(),
            tags: Vec::new(),
            confidence: FILE_NODE_CONFIDENCE,
            evidence: Vec::new(),
        }
    }

    fn symbol_node(path: &str, name: &str, kind: NodeKind) -> Node {
        Node {
            id: node_id(kind, path, name),
            kind,
            name: name.to_string(),
            path: path.to_string(),
            lang: "rust".to_string(),
            summary: String::new(),
            tags: Vec::new(),
            confidence: 0.7,
            evidence: vec![Evidence::line(path, 1)],
        }
    }

    #[test]
    fn node_id_is_pure_and_kind_prefixed() {
        assert_eq!(node_id(NodeKind::File, "src/lib.rs", ""), "file:src/lib.rs");
        assert_eq!(
            node_id(NodeKind::Function, "src/lib.rs", "run"),
            "fn:src/lib.rs:run"
        );
        assert_eq!(
            node_id(NodeKind::Function, "src/lib.rs", "run"),
            node_id(NodeKind::Function, "src/lib.rs", "run")
        );
        assert_ne!(
            node_id(NodeKind::Function, "src/lib.rs", "run"),
            node_id(NodeKind::Method, "src/lib.rs", "run")
        );
    }

    #[test]
    fn duplicate_node_id_keeps_first_writer() {
        let mut store = GraphStore::new();
        let mut first = file_node("src/lib.rs");
        first.summary = "kept".to_string();
        assert!(store.add_node(first));

        let mut second = file_node("src/lib.rs");
        second.summary = "dropped".to_string();
        assert!(!store.add_node(second));

        assert_eq!(store.nodes().len(), 1);
        assert_eq!(store.node("file:src/lib.rs").expect("node").summary, "kept");
    }

    #[test]
    fn duplicate_edge_key_is_dropped_without_merging_evidence() {
        let mut store = GraphStore::new();
        let first = Edge {
            source: "a".to_string(),
            target: "b".to_string(),
            kind: EDGE_CALLS.to_string(),
            evidence: vec![Evidence::line("src/lib.rs", 3)],
            weight: CALL_EDGE_WEIGHT,
        };
        let second = Edge {
            evidence: vec![Evidence::line("src/lib.rs", 9)],
            ..first.clone()
        };

        assert!(store.add_edge(first));
        assert!(!store.add_edge(second));
        assert_eq!(store.edges().len(), 1);
        assert_eq!(store.edges()[0].evidence[0].start_line, 3);
    }

    #[test]
    fn indexes_split_symbols_from_file_paths() {
        let mut store = GraphStore::new();
        store.add_node(file_node("src/a.rs"));
        store.add_node(symbol_node("src/a.rs", "run", NodeKind::Function));
        store.add_node(symbol_node("src/b.rs", "run", NodeKind::Method));

        let (symbols, paths) = store.build_indexes();
        assert_eq!(
            symbols.get("run").expect("symbol entry"),
            &vec![
                "fn:src/a.rs:run".to_string(),
                "meth:src/b.rs:run".to_string()
            ]
        );
        assert_eq!(paths.get("src/a.rs").expect("path entry"), "file:src/a.rs");
        assert!(!symbols.contains_key("a.rs"));
    }

    #[test]
    fn tag_node_appends_once() {
        let mut store = GraphStore::new();
        store.add_node(file_node("src/big.rs"));
        assert!(store.tag_node("file:src/big.rs", "god_object"));
        assert!(!store.tag_node("file:src/big.rs", "god_object"));
        assert!(!store.tag_node("file:src/missing.rs", "god_object"));
        assert_eq!(
            store.node("file:src/big.rs").expect("node").tags,
            vec!["god_object".to_string()]
        );
    }

    #[test]
    fn node_round_trips_through_store_field_names() {
        let node = symbol_node("src/a.rs", "run", NodeKind::Function);
        let raw = serde_json::to_value(&node).expect("serialize");
        assert_eq!(raw["type"], "function");
        assert_eq!(raw["evidence"][0]["start_line"], 1);
        let back: Node = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(back, node);
    }
}
