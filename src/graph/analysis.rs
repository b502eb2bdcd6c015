//! Dependency analysis over the symbol graph: reachability, impact
//! scoring, and circular-dependency detection.

use super::SymbolGraph;
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use serde::Serialize;
use std::collections::HashSet;

/// Outcome of [`SymbolGraph::analyze_dependencies`].
///
/// The impact score is `dependents / total symbols`, clamped to [0, 1]:
/// the share of the index that transitively references the symbol. Empty
/// graphs score 0.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyAnalysis {
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub impact_score: f64,
}

pub(super) fn analyze(graph: &SymbolGraph, id: &str) -> DependencyAnalysis {
    let dependencies = reachable(graph, id, Direction::Outgoing);
    let dependents = reachable(graph, id, Direction::Incoming);
    let total = graph.symbol_count();
    let impact_score = if total == 0 {
        0.0
    } else {
        (dependents.len() as f64 / total as f64).clamp(0.0, 1.0)
    };
    DependencyAnalysis {
        dependencies,
        dependents,
        impact_score,
    }
}

/// BFS over one edge direction, excluding the start symbol itself.
fn reachable(graph: &SymbolGraph, id: &str, direction: Direction) -> Vec<String> {
    let Some(start) = graph.node_of(id) else {
        return Vec::new();
    };
    let pg = graph.petgraph();
    let mut visited = HashSet::new();
    visited.insert(start);
    let mut queue = vec![start];
    let mut out = Vec::new();

    while let Some(node) = queue.pop() {
        for neighbor in pg.neighbors_directed(node, direction) {
            if visited.insert(neighbor) {
                out.push(pg[neighbor].clone());
                queue.push(neighbor);
            }
        }
    }
    out
}

/// Strongly connected components with more than one member, each an
/// ordered id cycle. Node insertion order makes the output deterministic.
pub(super) fn circular_dependencies(graph: &SymbolGraph) -> Vec<Vec<String>> {
    let pg = graph.petgraph();
    tarjan_scc(pg)
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|component| {
            component
                .into_iter()
                .map(|node| pg[node].clone())
                .collect()
        })
        .collect()
}
