use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use crate::config::Ruleset;
use crate::extract::{self, Extractor, Symbol};
use crate::graph::{
    CALL_EDGE_WEIGHT, DEFINES_EDGE_WEIGHT, EDGE_CALLS, EDGE_DEFINES, Edge, Evidence, GraphStore,
    Node, NodeKind, node_id,
};

pub const GOD_OBJECT_TAG: &str = "god_object";
pub const GOD_OBJECT_METHOD_LIMIT: usize = 20;
pub const GOD_OBJECT_LOC_LIMIT: u64 = 500;

#[derive(Debug, Default)]
pub struct DeepenOutcome {
    pub files_analyzed: usize,
    pub symbols_added: usize,
}

/// Pass 2: bounded multi-source BFS over the pass-1 graph. Two budgets
/// apply, files deep-analyzed and hop depth. Only file nodes spend the
/// file budget; import targets and hash-unchanged files are traversed
/// through without analysis.
pub fn run_pass_two(
    root: &Path,
    seeds: &[String],
    graph: &mut GraphStore,
    unchanged: &HashSet<String>,
    max_depth: u32,
    max_files: usize,
    extractor: Extractor,
    rules: &Ruleset,
    verbose: bool,
) -> DeepenOutcome {
    // Adjacency over the pass-1 edge snapshot; edges added below do not
    // extend the frontier within the same run.
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for edge in graph.edges() {
        adjacency
            .entry(edge.source.clone())
            .or_default()
            .push(edge.target.clone());
        adjacency
            .entry(edge.target.clone())
            .or_default()
            .push(edge.source.clone());
    }

    let file_info: HashMap<String, (String, String)> = graph
        .nodes()
        .iter()
        .filter(|node| node.kind == NodeKind::File)
        .map(|node| (node.id.clone(), (node.path.clone(), node.lang.clone())))
        .collect();

    let mut outcome = DeepenOutcome::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, u32)> =
        seeds.iter().map(|id| (id.clone(), 0)).collect();

    while let Some((id, depth)) = queue.pop_front() {
        if outcome.files_analyzed >= max_files {
            break;
        }
        if !visited.insert(id.clone()) {
            continue;
        }

        if let Some((path, lang)) = file_info.get(&id)
            && !unchanged.contains(&id)
        {
            let path = path.clone();
            let lang = lang.clone();
            if analyze_file(root, &id, &path, &lang, graph, extractor, rules, &mut outcome) {
                outcome.files_analyzed += 1;
                if verbose {
                    eprintln!("  [pass2] {path} (depth {depth})");
                }
            }
        }

        if depth < max_depth
            && let Some(neighbors) = adjacency.get(&id)
        {
            for neighbor in neighbors {
                if !visited.contains(neighbor) {
                    queue.push_back((neighbor.clone(), depth + 1));
                }
            }
        }
    }

    outcome
}

/// Symbol nodes, defines edges, heuristic call edges, and god-object tags
/// for one file. Returns false when the file is unreadable or empty, in
/// which case it does not spend the file budget.
fn analyze_file(
    root: &Path,
    file_id: &str,
    path: &str,
    lang: &str,
    graph: &mut GraphStore,
    extractor: Extractor,
    rules: &Ruleset,
    outcome: &mut DeepenOutcome,
) -> bool {
    let abs = root.join(path);
    let lines = super::read_lines(&abs);
    if lines.is_empty() {
        return false;
    }

    let symbols = extractor.extract(&abs, &lines, lang, rules);
    let callable_count = symbols
        .iter()
        .filter(|symbol| symbol.kind.is_callable())
        .count();
    let crowded = callable_count > GOD_OBJECT_METHOD_LIMIT;

    let mut placed: Vec<(String, &Symbol)> = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        let symbol_id = node_id(symbol.kind, path, &symbol.name);
        let mut tags = Vec::new();
        if crowded && symbol.kind.is_classlike() {
            tags.push(GOD_OBJECT_TAG.to_string());
        }
        if graph.add_node(Node {
            id: symbol_id.clone(),
            kind: symbol.kind,
            name: symbol.name.clone(),
            path: path.to_string(),
            lang: lang.to_string(),
            summary: String::new(),
            tags,
            confidence: symbol.confidence,
            evidence: vec![Evidence::span(path, symbol.start_line, symbol.end_line)],
        }) {
            outcome.symbols_added += 1;
        }
        graph.add_edge(Edge {
            source: file_id.to_string(),
            target: symbol_id.clone(),
            kind: EDGE_DEFINES.to_string(),
            evidence: vec![Evidence::span(path, symbol.start_line, symbol.end_line)],
            weight: DEFINES_EDGE_WEIGHT,
        });
        placed.push((symbol_id, symbol));
    }

    link_call_sites(path, &lines, &placed, graph);

    // Post-pass file tag, re-counted from disk so the record and the tag
    // agree on the file as analyzed.
    if super::count_lines(&abs) > GOD_OBJECT_LOC_LIMIT && crowded {
        graph.tag_node(file_id, GOD_OBJECT_TAG);
    }

    true
}

/// Heuristic intra-file call edges. For each ordered symbol pair, the
/// first whole-word reference to the callee's name that is not the
/// callee's own definition line becomes one `calls` edge at low weight.
fn link_call_sites(
    path: &str,
    lines: &[String],
    placed: &[(String, &Symbol)],
    graph: &mut GraphStore,
) {
    if placed.len() < 2 {
        return;
    }

    let mut references: HashMap<&str, Vec<u32>> = HashMap::new();
    for (_, symbol) in placed {
        references
            .entry(symbol.name.as_str())
            .or_insert_with(|| extract::reference_lines(lines, &symbol.name));
    }

    for (source_id, _) in placed {
        for (target_id, target) in placed {
            if source_id == target_id {
                continue;
            }
            let Some(lines_with_name) = references.get(target.name.as_str()) else {
                continue;
            };
            let Some(call_line) = lines_with_name
                .iter()
                .find(|line| **line != target.start_line)
            else {
                continue;
            };
            graph.add_edge(Edge {
                source: source_id.clone(),
                target: target_id.clone(),
                kind: EDGE_CALLS.to_string(),
                evidence: vec![Evidence::line(path, *call_line)],
                weight: CALL_EDGE_WEIGHT,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EDGE_IMPORTS, FILE_NODE_CONFIDENCE, IMPORT_EDGE_WEIGHT, import_node_id};
    use std::fs;

    fn seed_file(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    fn file_node(path: &str, lang: &str) -> Node {
        Node {
            id: node_id(NodeKind::File, path, ""),
            kind: NodeKind::File,
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            lang: lang.to_string(),
            summary: String::new(),
            tags: Vec::new(),
            confidence: FILE_NODE_CONFIDENCE,
            evidence: Vec::new(),
        }
    }

    fn deepen(
        root: &Path,
        seeds: &[&str],
        graph: &mut GraphStore,
        max_depth: u32,
        max_files: usize,
    ) -> DeepenOutcome {
        let rules = Ruleset::builtin().expect("rules");
        let seeds: Vec<String> = seeds.iter().map(|id| id.to_string()).collect();
        run_pass_two(
            root,
            &seeds,
            graph,
            &HashSet::new(),
            max_depth,
            max_files,
            Extractor::Patterns,
            &rules,
            false,
        )
    }

    #[test]
    fn caller_gets_one_low_weight_edge_to_callee() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_file(
            dir.path(),
            "tool.py",
            "def run():\n    helper()\n\ndef helper():\n    pass\n",
        );

        let mut graph = GraphStore::new();
        graph.add_node(file_node("tool.py", "python"));
        let outcome = deepen(dir.path(), &["file:tool.py"], &mut graph, 3, 500);

        assert_eq!(outcome.files_analyzed, 1);
        assert_eq!(outcome.symbols_added, 2);

        let defines: Vec<_> = graph
            .edges()
            .iter()
            .filter(|edge| edge.kind == EDGE_DEFINES)
            .collect();
        assert_eq!(defines.len(), 2);
        assert!(defines.iter().all(|edge| edge.weight == DEFINES_EDGE_WEIGHT));

        // run references helper on line 2; helper's only sight of run is
        // run's own definition, which does not count.
        let calls: Vec<_> = graph
            .edges()
            .iter()
            .filter(|edge| edge.kind == EDGE_CALLS)
            .collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].source, "fn:tool.py:run");
        assert_eq!(calls[0].target, "fn:tool.py:helper");
        assert_eq!(calls[0].weight, CALL_EDGE_WEIGHT);
        assert_eq!(calls[0].evidence[0].start_line, 2);
    }

    #[test]
    fn crowded_class_and_long_file_earn_god_object_tags() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut source = String::from("class Hub:\n");
        for idx in 0..25 {
            source.push_str(&format!("def m{idx:02}():\n    pass\n"));
        }
        while source.lines().count() <= 501 {
            source.push_str("# filler\n");
        }
        seed_file(dir.path(), "hub.py", &source);

        let mut graph = GraphStore::new();
        graph.add_node(file_node("hub.py", "python"));
        deepen(dir.path(), &["file:hub.py"], &mut graph, 3, 500);

        let class = graph.node("cls:hub.py:Hub").expect("class node");
        assert_eq!(class.tags, vec![GOD_OBJECT_TAG.to_string()]);
        let file = graph.node("file:hub.py").expect("file node");
        assert_eq!(file.tags, vec![GOD_OBJECT_TAG.to_string()]);
    }

    #[test]
    fn crowded_but_short_file_tags_only_the_class() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut source = String::from("class Hub:\n");
        for idx in 0..25 {
            source.push_str(&format!("def m{idx:02}():\n    pass\n"));
        }
        seed_file(dir.path(), "hub.py", &source);

        let mut graph = GraphStore::new();
        graph.add_node(file_node("hub.py", "python"));
        deepen(dir.path(), &["file:hub.py"], &mut graph, 3, 500);

        assert_eq!(
            graph.node("cls:hub.py:Hub").expect("class").tags,
            vec![GOD_OBJECT_TAG.to_string()]
        );
        assert!(graph.node("file:hub.py").expect("file").tags.is_empty());
    }

    #[test]
    fn traversal_passes_through_import_targets() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_file(dir.path(), "a.py", "import shared\n\ndef alpha():\n    pass\n");
        seed_file(dir.path(), "b.py", "import shared\n\ndef beta():\n    pass\n");

        let mut graph = GraphStore::new();
        graph.add_node(file_node("a.py", "python"));
        graph.add_node(file_node("b.py", "python"));
        for source in ["file:a.py", "file:b.py"] {
            graph.add_edge(Edge {
                source: source.to_string(),
                target: import_node_id("shared"),
                kind: EDGE_IMPORTS.to_string(),
                evidence: vec![Evidence::line("a.py", 1)],
                weight: IMPORT_EDGE_WEIGHT,
            });
        }

        // a.py -> import:shared -> b.py needs two hops.
        let outcome = deepen(dir.path(), &["file:a.py"], &mut graph, 2, 500);
        assert_eq!(outcome.files_analyzed, 2);
        assert!(graph.contains_node("fn:b.py:beta"));

        // At depth 1 the frontier stops on the import target.
        let mut shallow = GraphStore::new();
        shallow.add_node(file_node("a.py", "python"));
        shallow.add_node(file_node("b.py", "python"));
        for source in ["file:a.py", "file:b.py"] {
            shallow.add_edge(Edge {
                source: source.to_string(),
                target: import_node_id("shared"),
                kind: EDGE_IMPORTS.to_string(),
                evidence: vec![Evidence::line("a.py", 1)],
                weight: IMPORT_EDGE_WEIGHT,
            });
        }
        let outcome = deepen(dir.path(), &["file:a.py"], &mut shallow, 1, 500);
        assert_eq!(outcome.files_analyzed, 1);
        assert!(!shallow.contains_node("fn:b.py:beta"));
    }

    #[test]
    fn file_budget_stops_analysis_not_bookkeeping() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_file(dir.path(), "a.py", "def alpha():\n    pass\n");
        seed_file(dir.path(), "b.py", "def beta():\n    pass\n");

        let mut graph = GraphStore::new();
        graph.add_node(file_node("a.py", "python"));
        graph.add_node(file_node("b.py", "python"));
        let outcome = deepen(dir.path(), &["file:a.py", "file:b.py"], &mut graph, 3, 1);

        assert_eq!(outcome.files_analyzed, 1);
        assert!(graph.contains_node("fn:a.py:alpha"));
        assert!(!graph.contains_node("fn:b.py:beta"));
    }

    #[test]
    fn unchanged_files_are_traversed_but_not_analyzed() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_file(dir.path(), "a.py", "def alpha():\n    pass\n");

        let mut graph = GraphStore::new();
        graph.add_node(file_node("a.py", "python"));
        let rules = Ruleset::builtin().expect("rules");
        let unchanged: HashSet<String> = ["file:a.py".to_string()].into();
        let outcome = run_pass_two(
            dir.path(),
            &["file:a.py".to_string()],
            &mut graph,
            &unchanged,
            3,
            500,
            Extractor::Patterns,
            &rules,
            false,
        );

        assert_eq!(outcome.files_analyzed, 0);
        assert!(!graph.contains_node("fn:a.py:alpha"));
    }

    #[test]
    fn unreadable_file_does_not_spend_the_budget() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_file(dir.path(), "b.py", "def beta():\n    pass\n");

        let mut graph = GraphStore::new();
        graph.add_node(file_node("gone.py", "python"));
        graph.add_node(file_node("b.py", "python"));
        let outcome = deepen(dir.path(), &["file:gone.py", "file:b.py"], &mut graph, 3, 1);

        assert_eq!(outcome.files_analyzed, 1);
        assert!(graph.contains_node("fn:b.py:beta"));
    }
}
