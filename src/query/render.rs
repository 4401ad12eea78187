use std::fmt::Write as _;

use super::bundle::ContextBundle;

/// Markdown rendering of a bundle, the default output surface. Evidence
/// lines are opt-in to keep the default view compact.
pub fn render_markdown(bundle: &ContextBundle, include_evidence: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "# Context bundle");
    let _ = writeln!(&mut out);
    if !bundle.query.is_empty() {
        let _ = writeln!(&mut out, "Query: {}", bundle.query);
        let _ = writeln!(&mut out);
    }

    let _ = writeln!(&mut out, "## Nodes ({})", bundle.nodes.len());
    let _ = writeln!(&mut out);
    for node in &bundle.nodes {
        let mut line = format!(
            "- `{}` {} **{}** ({})",
            node.id,
            node.kind.as_str(),
            node.name,
            node.path
        );
        if !node.tags.is_empty() {
            let _ = write!(&mut line, " [{}]", node.tags.join(", "));
        }
        let _ = writeln!(&mut out, "{line}");
        if include_evidence {
            for evidence in &node.evidence {
                let _ = writeln!(
                    &mut out,
                    "  - evidence: {}:{}-{}",
                    evidence.path, evidence.start_line, evidence.end_line
                );
            }
        }
    }

    let _ = writeln!(&mut out);
    let _ = writeln!(&mut out, "## Edges ({})", bundle.edges.len());
    let _ = writeln!(&mut out);
    for edge in &bundle.edges {
        let _ = writeln!(
            &mut out,
            "- `{}` {} `{}` (weight {:.1})",
            edge.source, edge.kind, edge.target, edge.weight
        );
        if include_evidence {
            for evidence in &edge.evidence {
                let _ = writeln!(
                    &mut out,
                    "  - evidence: {}:{}-{}",
                    evidence.path, evidence.start_line, evidence.end_line
                );
            }
        }
    }

    if !bundle.hotspots.is_empty() {
        let _ = writeln!(&mut out);
        let _ = writeln!(&mut out, "## Hotspots");
        let _ = writeln!(&mut out);
        for hotspot in &bundle.hotspots {
            let _ = writeln!(
                &mut out,
                "- {} (`{}`, degree {})",
                hotspot.name, hotspot.id, hotspot.degree
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        DEFINES_EDGE_WEIGHT, EDGE_DEFINES, Edge, Evidence, Node, NodeKind, node_id,
    };
    use crate::query::bundle::Hotspot;

    fn sample_bundle() -> ContextBundle {
        ContextBundle {
            query: "symbol=run".to_string(),
            nodes: vec![Node {
                id: node_id(NodeKind::Function, "tool.py", "run"),
                kind: NodeKind::Function,
                name: "run".to_string(),
                path: "tool.py".to_string(),
                lang: "python".to_string(),
                summary: String::new(),
                tags: vec!["god_object".to_string()],
                confidence: 0.7,
                evidence: vec![Evidence::span("tool.py", 1, 2)],
            }],
            edges: vec![Edge {
                source: "file:tool.py".to_string(),
                target: "fn:tool.py:run".to_string(),
                kind: EDGE_DEFINES.to_string(),
                evidence: vec![Evidence::line("tool.py", 1)],
                weight: DEFINES_EDGE_WEIGHT,
            }],
            hotspots: vec![Hotspot {
                id: "fn:tool.py:run".to_string(),
                name: "run".to_string(),
                degree: 1,
            }],
        }
    }

    #[test]
    fn renders_all_sections() {
        let md = render_markdown(&sample_bundle(), false);
        assert!(md.contains("Query: symbol=run"));
        assert!(md.contains("## Nodes (1)"));
        assert!(md.contains("- `fn:tool.py:run` function **run** (tool.py) [god_object]"));
        assert!(md.contains("## Edges (1)"));
        assert!(md.contains("- `file:tool.py` defines `fn:tool.py:run` (weight 0.9)"));
        assert!(md.contains("- run (`fn:tool.py:run`, degree 1)"));
        assert!(!md.contains("evidence:"));
    }

    #[test]
    fn evidence_lines_are_opt_in() {
        let md = render_markdown(&sample_bundle(), true);
        assert!(md.contains("  - evidence: tool.py:1-2"));
        assert!(md.contains("  - evidence: tool.py:1-1"));
    }
}
