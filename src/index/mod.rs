pub mod deepen;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::config::Ruleset;
use crate::extract::{self, Extractor};
use crate::graph::{
    EDGE_IMPORTS, Edge, Evidence, FILE_NODE_CONFIDENCE, FileRecord, GraphStore, IMPORT_EDGE_WEIGHT,
    Node, NodeKind, import_node_id, node_id,
};
use crate::scan;
use crate::store::{self, RunMeta, StoreError};

pub const LARGE_FILE_LOC: u64 = 1000;
pub const LARGE_FILE_TAG: &str = "large_file";

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub root: PathBuf,
    pub output_dir: PathBuf,
    pub full: bool,
    pub since_ref: Option<String>,
    pub max_files: usize,
    pub max_depth: u32,
    pub verbose: bool,
}

#[derive(Debug)]
pub struct IndexReport {
    pub file_count: usize,
    pub entry_point_count: usize,
    pub seed_count: usize,
    pub symbol_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub extractor: &'static str,
    pub elapsed_seconds: f64,
    pub warnings: Vec<String>,
}

/// Transient pass-1 products: entry points, fan-out/fan-in tallies (kept
/// in memory only, for seed ranking) and the hash-unchanged skip set.
#[derive(Debug, Default)]
pub struct Inventory {
    pub entry_points: BTreeSet<String>,
    pub fan_out: HashMap<String, usize>,
    pub fan_in: HashMap<String, usize>,
    pub unchanged: HashSet<String>,
}

/// Streamed sha256 content digest. `None` means unreadable; the caller
/// silently excludes the file.
pub fn hash_file(path: &Path) -> Option<String> {
    use std::io::Read;
    let mut file = fs::File::open(path).ok()?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(_) => return None,
        }
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    Some(out)
}

pub fn read_lines(path: &Path) -> Vec<String> {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}

pub fn count_lines(path: &Path) -> u64 {
    read_lines(path).len() as u64
}

/// Extension lookup first, shebang sniff second.
pub fn detect_lang(path: &Path, rules: &Ruleset) -> Option<String> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()));
    if let Some(ext) = ext
        && let Some(lang) = rules.lang_for_ext(&ext)
    {
        return Some(lang.to_string());
    }
    let first_line = read_lines(path).into_iter().next()?;
    rules.lang_for_shebang(&first_line).map(str::to_string)
}

pub fn is_entry_point(rel: &Path, rules: &Ruleset) -> bool {
    let file_name = rel.file_name().and_then(|name| name.to_str()).unwrap_or("");
    if rules.is_build_file(file_name) {
        return true;
    }
    let stem = rel
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if rules.is_entry_stem(&stem) {
        return true;
    }
    // cmd/<tool>/main.go style executables.
    let components: Vec<&str> = rel
        .iter()
        .filter_map(|component| component.to_str())
        .collect();
    if file_name.starts_with("main") && components.len() >= 2 {
        if components[components.len() - 2] == "cmd" {
            return true;
        }
        if components.len() >= 3 && components[0] == "cmd" {
            return true;
        }
    }
    false
}

/// Pass 1: coarse inventory. One file node + record per recognizable
/// file; import edges and fan tallies only for files taking the full
/// extraction path. Unchanged files reuse their previous record verbatim
/// and join the pass-2 skip set.
pub fn run_pass_one(
    root: &Path,
    files: &[PathBuf],
    prior: &HashMap<String, FileRecord>,
    full: bool,
    rules: &Ruleset,
    graph: &mut GraphStore,
    verbose: bool,
) -> Inventory {
    let mut inventory = Inventory::default();
    let now = Utc::now().to_rfc3339();

    for path in files {
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel_str = rel.to_string_lossy().into_owned();

        let Some(lang) = detect_lang(path, rules) else {
            continue;
        };
        let Some(hash) = hash_file(path) else {
            continue;
        };

        let file_id = node_id(NodeKind::File, &rel_str, "");
        let file_name = rel
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&rel_str)
            .to_string();

        if is_entry_point(rel, rules) {
            inventory.entry_points.insert(file_id.clone());
        }

        if !full
            && let Some(record) = prior.get(&rel_str)
            && record.hash == hash
        {
            graph.add_node(Node {
                id: file_id.clone(),
                kind: NodeKind::File,
                name: file_name,
                path: rel_str,
                lang,
                summary: String::new(),
                tags: Vec::new(),
                confidence: FILE_NODE_CONFIDENCE,
                evidence: Vec::new(),
            });
            graph.add_file(record.clone());
            inventory.unchanged.insert(file_id);
            continue;
        }

        let loc = count_lines(path);
        let mut tags = Vec::new();
        if loc > LARGE_FILE_LOC {
            tags.push(LARGE_FILE_TAG.to_string());
        }

        graph.add_node(Node {
            id: file_id.clone(),
            kind: NodeKind::File,
            name: file_name,
            path: rel_str.clone(),
            lang: lang.clone(),
            summary: String::new(),
            tags,
            confidence: FILE_NODE_CONFIDENCE,
            evidence: Vec::new(),
        });
        graph.add_file(FileRecord {
            path: rel_str.clone(),
            hash,
            lang: lang.clone(),
            loc,
            last_indexed: now.clone(),
        });

        let lines = read_lines(path);
        let imports = extract::extract_imports(&lines, &lang, rules);
        inventory.fan_out.insert(file_id.clone(), imports.len());
        for (target, lineno) in &imports {
            let target_id = import_node_id(target);
            graph.add_edge(Edge {
                source: file_id.clone(),
                target: target_id.clone(),
                kind: EDGE_IMPORTS.to_string(),
                evidence: vec![Evidence::line(&rel_str, *lineno)],
                weight: IMPORT_EDGE_WEIGHT,
            });
            *inventory.fan_in.entry(target_id).or_insert(0) += 1;
        }

        if verbose {
            eprintln!("  [pass1] {rel_str} ({lang}, {loc} loc, {} imports)", imports.len());
        }
    }

    inventory
}

/// Seeds = entry points plus the top decile of files by total degree,
/// entry points first, truncated to the max-files budget. The decile is
/// max(1, N/10) with integer division, counted before truncation.
pub fn select_seeds(inventory: &Inventory, graph: &GraphStore, max_files: usize) -> Vec<String> {
    let file_ids: Vec<&str> = graph
        .nodes()
        .iter()
        .filter(|node| node.kind == NodeKind::File)
        .map(|node| node.id.as_str())
        .collect();

    let mut seeds: Vec<String> = file_ids
        .iter()
        .filter(|id| inventory.entry_points.contains(**id))
        .map(|id| id.to_string())
        .collect();

    let mut by_degree: Vec<(&str, usize)> = file_ids
        .iter()
        .map(|id| {
            let degree = inventory.fan_out.get(*id).copied().unwrap_or(0)
                + inventory.fan_in.get(*id).copied().unwrap_or(0);
            (*id, degree)
        })
        .collect();
    by_degree.sort_by(|a, b| b.1.cmp(&a.1));

    let decile = (file_ids.len() / 10).max(1);
    seeds.extend(
        by_degree
            .iter()
            .take(decile)
            .filter(|(id, _)| !inventory.entry_points.contains(*id))
            .map(|(id, _)| id.to_string()),
    );

    seeds.truncate(max_files);
    seeds
}

/// Full indexing run: enumerate, two passes, derived indexes, persisted
/// store. The extractor capability is probed once here and reported.
pub fn run_index(opts: &IndexOptions, rules: &Ruleset) -> Result<IndexReport, StoreError> {
    let started = Instant::now();
    let (mut files, warnings) = scan::candidate_files(&opts.root, rules, opts.since_ref.as_deref());
    files.sort();
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    let prior: HashMap<String, FileRecord> = if opts.full {
        HashMap::new()
    } else {
        store::load_file_records(&opts.output_dir)
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect()
    };

    let extractor = Extractor::probe();
    eprintln!(
        "symbol extraction: {} (confidence {:.1})",
        extractor.label(),
        extractor.confidence()
    );

    let mut graph = GraphStore::new();
    let inventory = run_pass_one(
        &opts.root,
        &files,
        &prior,
        opts.full,
        rules,
        &mut graph,
        opts.verbose,
    );

    let seeds = select_seeds(&inventory, &graph, opts.max_files);
    let deepened = deepen::run_pass_two(
        &opts.root,
        &seeds,
        &mut graph,
        &inventory.unchanged,
        opts.max_depth,
        opts.max_files,
        extractor,
        rules,
        opts.verbose,
    );

    let (symbol_index, path_index) = graph.build_indexes();
    let elapsed = started.elapsed().as_secs_f64();
    let meta = RunMeta {
        root: opts.root.to_string_lossy().into_owned(),
        indexed_at: Utc::now().to_rfc3339(),
        file_count: graph.files().len(),
        node_count: graph.nodes().len(),
        edge_count: graph.edges().len(),
        elapsed_seconds: (elapsed * 100.0).round() / 100.0,
    };
    let overview = render_overview(&meta, &graph, &inventory, extractor);
    store::write_store(
        &opts.output_dir,
        &graph,
        &symbol_index,
        &path_index,
        &meta,
        &overview,
    )?;

    Ok(IndexReport {
        file_count: graph.files().len(),
        entry_point_count: inventory.entry_points.len(),
        seed_count: seeds.len(),
        symbol_count: deepened.symbols_added,
        node_count: graph.nodes().len(),
        edge_count: graph.edges().len(),
        extractor: extractor.label(),
        elapsed_seconds: meta.elapsed_seconds,
        warnings,
    })
}

fn render_overview(
    meta: &RunMeta,
    graph: &GraphStore,
    inventory: &Inventory,
    extractor: Extractor,
) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "# Knowledge Graph Overview");
    let _ = writeln!(&mut out);
    let _ = writeln!(&mut out, "- **Root**: {}", meta.root);
    let _ = writeln!(&mut out, "- **Indexed at**: {}", meta.indexed_at);
    let _ = writeln!(&mut out, "- **Files**: {}", meta.file_count);
    let _ = writeln!(&mut out, "- **Nodes**: {}", meta.node_count);
    let _ = writeln!(&mut out, "- **Edges**: {}", meta.edge_count);
    let _ = writeln!(&mut out, "- **Extractor**: {}", extractor.label());

    if !inventory.entry_points.is_empty() {
        let _ = writeln!(&mut out);
        let _ = writeln!(&mut out, "## Entry points");
        let _ = writeln!(&mut out);
        for id in &inventory.entry_points {
            if let Some(node) = graph.node(id) {
                let _ = writeln!(&mut out, "- {}", node.path);
            }
        }
    }

    let mut degrees: Vec<(&Node, usize)> = graph
        .nodes()
        .iter()
        .filter(|node| node.kind == NodeKind::File)
        .map(|node| {
            let degree = inventory.fan_out.get(&node.id).copied().unwrap_or(0)
                + inventory.fan_in.get(&node.id).copied().unwrap_or(0);
            (node, degree)
        })
        .filter(|(_, degree)| *degree > 0)
        .collect();
    degrees.sort_by(|a, b| b.1.cmp(&a.1));
    if !degrees.is_empty() {
        let _ = writeln!(&mut out);
        let _ = writeln!(&mut out, "## High-degree files");
        let _ = writeln!(&mut out);
        for (node, degree) in degrees.into_iter().take(10) {
            let _ = writeln!(&mut out, "- {} ({degree} references)", node.path);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    fn inventory_for(root: &Path, rules: &Ruleset, graph: &mut GraphStore) -> Inventory {
        let (files, _) = scan::candidate_files(root, rules, None);
        let mut sorted = files;
        sorted.sort();
        run_pass_one(root, &sorted, &HashMap::new(), false, rules, graph, false)
    }

    #[test]
    fn pass_one_builds_file_nodes_import_edges_and_fan_counts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rules = Ruleset::builtin().expect("rules");
        seed(dir.path(), "a.py", "import os\nimport sys\n");
        seed(dir.path(), "b.py", "import os\n");

        let mut graph = GraphStore::new();
        let inventory = inventory_for(dir.path(), &rules, &mut graph);

        assert_eq!(graph.files().len(), 2);
        assert_eq!(graph.edges().len(), 3);
        assert_eq!(inventory.fan_out.get("file:a.py"), Some(&2));
        assert_eq!(inventory.fan_out.get("file:b.py"), Some(&1));
        assert_eq!(inventory.fan_in.get("import:os"), Some(&2));
        let edge = &graph.edges()[0];
        assert_eq!(edge.kind, EDGE_IMPORTS);
        assert_eq!(edge.weight, IMPORT_EDGE_WEIGHT);
        assert_eq!(edge.evidence[0].start_line, 1);
    }

    #[test]
    fn unrecognized_language_is_skipped_silently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rules = Ruleset::builtin().expect("rules");
        seed(dir.path(), "notes.xyz", "whatever\n");
        seed(dir.path(), "a.py", "import os\n");

        let mut graph = GraphStore::new();
        inventory_for(dir.path(), &rules, &mut graph);
        assert_eq!(graph.files().len(), 1);
        assert_eq!(graph.files()[0].path, "a.py");
    }

    #[test]
    fn shebang_fallback_names_the_language() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rules = Ruleset::builtin().expect("rules");
        seed(dir.path(), "tool", "#!/usr/bin/env python3\nimport os\n");

        let mut graph = GraphStore::new();
        inventory_for(dir.path(), &rules, &mut graph);
        assert_eq!(graph.files().len(), 1);
        assert_eq!(graph.files()[0].lang, "python");
    }

    #[test]
    fn unchanged_file_reuses_prior_record_and_skips_imports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rules = Ruleset::builtin().expect("rules");
        seed(dir.path(), "a.py", "import os\n");

        let hash = hash_file(&dir.path().join("a.py")).expect("hash");
        let prior_record = FileRecord {
            path: "a.py".to_string(),
            hash,
            lang: "python".to_string(),
            loc: 1,
            last_indexed: "2026-01-01T00:00:00+00:00".to_string(),
        };
        let prior: HashMap<String, FileRecord> =
            [("a.py".to_string(), prior_record.clone())].into();

        let mut graph = GraphStore::new();
        let files = vec![dir.path().join("a.py")];
        let inventory = run_pass_one(dir.path(), &files, &prior, false, &rules, &mut graph, false);

        assert!(inventory.unchanged.contains("file:a.py"));
        assert!(inventory.fan_out.is_empty());
        assert!(graph.edges().is_empty());
        assert_eq!(graph.files()[0], prior_record);

        // --full forces the extraction path even with a matching hash.
        let mut full_graph = GraphStore::new();
        let full = run_pass_one(dir.path(), &files, &prior, true, &rules, &mut full_graph, false);
        assert!(full.unchanged.is_empty());
        assert_eq!(full_graph.edges().len(), 1);
    }

    #[test]
    fn entry_points_come_from_stems_build_files_and_cmd_dirs() {
        let rules = Ruleset::builtin().expect("rules");
        assert!(is_entry_point(Path::new("src/main.rs"), &rules));
        assert!(is_entry_point(Path::new("Cargo.toml"), &rules));
        assert!(is_entry_point(Path::new("cmd/tool/main.go"), &rules));
        assert!(is_entry_point(Path::new("a/b/cmd/main.go"), &rules));
        assert!(!is_entry_point(Path::new("src/helpers.rs"), &rules));
    }

    #[test]
    fn seed_decile_is_floor_n_over_ten_with_minimum_one() {
        let rules = Ruleset::builtin().expect("rules");
        let dir = tempfile::tempdir().expect("tempdir");
        for idx in 0..25 {
            let imports: String = (0..idx).map(|n| format!("import m{n}\n")).collect();
            seed(dir.path(), &format!("f{idx:02}.py"), &imports);
        }

        let mut graph = GraphStore::new();
        let inventory = inventory_for(dir.path(), &rules, &mut graph);
        assert!(inventory.entry_points.is_empty());

        let seeds = select_seeds(&inventory, &graph, 500);
        assert_eq!(seeds.len(), 2);
        // Highest fan-out files win.
        assert_eq!(seeds[0], "file:f24.py");
        assert_eq!(seeds[1], "file:f23.py");
    }

    #[test]
    fn seed_selection_prefers_entry_points_when_truncating() {
        let rules = Ruleset::builtin().expect("rules");
        let dir = tempfile::tempdir().expect("tempdir");
        seed(dir.path(), "main.py", "import a\n");
        seed(dir.path(), "busy.py", "import a\nimport b\nimport c\n");
        seed(dir.path(), "quiet.py", "x = 1\n");

        let mut graph = GraphStore::new();
        let inventory = inventory_for(dir.path(), &rules, &mut graph);
        assert_eq!(
            inventory.entry_points,
            BTreeSet::from(["file:main.py".to_string()])
        );

        let seeds = select_seeds(&inventory, &graph, 1);
        assert_eq!(seeds, vec!["file:main.py".to_string()]);

        let unbounded = select_seeds(&inventory, &graph, 10);
        assert_eq!(
            unbounded,
            vec!["file:main.py".to_string(), "file:busy.py".to_string()]
        );
    }
}
