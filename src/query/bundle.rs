use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::graph::{Edge, Node};
use crate::store::LoadedStore;

pub const HOTSPOT_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct ContextBundle {
    pub query: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub hotspots: Vec<Hotspot>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Hotspot {
    pub id: String,
    pub name: String,
    pub degree: usize,
}

/// Undirected neighborhood expansion around the matched ids, bounded by
/// hop count and the node/edge caps. Edge endpoints with no stored node
/// (import targets) survive in edges but are dropped from the node list.
pub fn build(
    store: &LoadedStore,
    initial: &BTreeSet<String>,
    query: String,
    hops: u32,
    max_nodes: usize,
    max_edges: usize,
) -> ContextBundle {
    let node_map: HashMap<&str, &Node> = store
        .nodes
        .iter()
        .map(|node| (node.id.as_str(), node))
        .collect();

    let mut adjacency: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, edge) in store.edges.iter().enumerate() {
        adjacency.entry(edge.source.as_str()).or_default().push(idx);
        adjacency.entry(edge.target.as_str()).or_default().push(idx);
    }

    // Expansion collects edges in discovery order; within one hop the
    // frontier is walked in sorted-id order for determinism.
    let mut visited: HashSet<String> = initial.iter().cloned().collect();
    let mut frontier: Vec<String> = initial.iter().cloned().collect();
    let mut collected: Vec<usize> = Vec::new();
    let mut seen_edges: HashSet<usize> = HashSet::new();

    for _ in 0..hops {
        let mut next: Vec<String> = Vec::new();
        for id in &frontier {
            let Some(touching) = adjacency.get(id.as_str()) else {
                continue;
            };
            for &idx in touching {
                if seen_edges.insert(idx) {
                    collected.push(idx);
                }
                let edge = &store.edges[idx];
                let other = if edge.source == *id {
                    &edge.target
                } else {
                    &edge.source
                };
                if visited.insert(other.clone()) {
                    next.push(other.clone());
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    let mut edges: Vec<Edge> = collected
        .into_iter()
        .map(|idx| store.edges[idx].clone())
        .collect();
    edges.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    edges.truncate(max_edges);

    // Matched ids first, then surviving-edge endpoints in edge order;
    // the cap applies positionally before unknown ids are dropped.
    let mut ordered_ids: Vec<String> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    for id in initial {
        if seen_ids.insert(id.clone()) {
            ordered_ids.push(id.clone());
        }
    }
    for edge in &edges {
        for endpoint in [&edge.source, &edge.target] {
            if seen_ids.insert(endpoint.clone()) {
                ordered_ids.push(endpoint.clone());
            }
        }
    }
    ordered_ids.truncate(max_nodes);

    let nodes: Vec<Node> = ordered_ids
        .iter()
        .filter_map(|id| node_map.get(id.as_str()).map(|node| (*node).clone()))
        .collect();

    let hotspots = rank_hotspots(&edges, &nodes);

    ContextBundle {
        query,
        nodes,
        edges,
        hotspots,
    }
}

/// Degree count over the surviving edges, restricted to bundle nodes.
/// Ties keep first-touch order over the weight-sorted edge list.
fn rank_hotspots(edges: &[Edge], nodes: &[Node]) -> Vec<Hotspot> {
    let names: HashMap<&str, &str> = nodes
        .iter()
        .map(|node| (node.id.as_str(), node.name.as_str()))
        .collect();

    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for edge in edges {
        for endpoint in [edge.source.as_str(), edge.target.as_str()] {
            if !names.contains_key(endpoint) {
                continue;
            }
            let count = counts.entry(endpoint).or_insert(0);
            if *count == 0 {
                order.push(endpoint);
            }
            *count += 1;
        }
    }

    let mut ranked: Vec<Hotspot> = order
        .into_iter()
        .map(|id| Hotspot {
            id: id.to_string(),
            name: names.get(id).copied().unwrap_or(id).to_string(),
            degree: counts.get(id).copied().unwrap_or(0),
        })
        .collect();
    ranked.sort_by(|a, b| b.degree.cmp(&a.degree));
    ranked.truncate(HOTSPOT_LIMIT);
    ranked
}
