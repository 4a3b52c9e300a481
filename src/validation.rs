// src/validation.rs

//! Structural checks run right before a flow is persisted.
//!
//! Everything here is recomputed from scratch on each call; saves are rare
//! and user-triggered, so there is no incremental state to keep in sync.

use std::collections::{HashMap, HashSet};

use petgraph::{
    Direction::Incoming,
    graph::{DiGraph, NodeIndex},
    visit::Dfs,
};
use tracing::error;

use crate::{
    error::{IntegrityFault, ValidationError},
    graph::{Edge, Graph, Node, NodeId},
};

/// Checks that `graph` may be saved.
///
/// Empty and single-node graphs always pass. Larger graphs need exactly one
/// node without incoming edges.
pub fn validate(graph: &Graph) -> Result<(), ValidationError> {
    validate_parts(graph.nodes(), graph.edges())
}

pub fn validate_parts(nodes: &[Node], edges: &[Edge]) -> Result<(), ValidationError> {
    if let Err(fault) = check_integrity(nodes, edges) {
        error!(%fault, "refusing to validate a corrupt graph");
        return Err(fault.into());
    }

    if nodes.len() <= 1 {
        return Ok(());
    }

    let roots = entry_points(nodes, edges);
    if roots.len() > 1 {
        return Err(ValidationError::MultipleEntryPoints { roots });
    }
    Ok(())
}

/// Detects breaches of the model's own invariants: duplicate ids, positions
/// that cannot be stored, dangling edges and sources with more than one
/// outgoing edge.
pub fn check_integrity(nodes: &[Node], edges: &[Edge]) -> Result<(), IntegrityFault> {
    let mut node_ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !node_ids.insert(&node.id) {
            return Err(IntegrityFault::DuplicateNodeId(node.id.clone()));
        }
        if !node.position.is_finite() {
            return Err(IntegrityFault::NonFinitePosition(node.id.clone()));
        }
    }

    let mut edge_ids = HashSet::with_capacity(edges.len());
    let mut out_degree: HashMap<&NodeId, usize> = HashMap::new();
    for edge in edges {
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(IntegrityFault::DuplicateEdgeId(edge.id.clone()));
        }
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains(endpoint) {
                return Err(IntegrityFault::DanglingEdge {
                    edge: edge.id.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
        *out_degree.entry(&edge.source).or_default() += 1;
    }

    // report the first offender in node order so the message is deterministic
    for node in nodes {
        let count = out_degree.get(&node.id).copied().unwrap_or(0);
        if count > 1 {
            return Err(IntegrityFault::OutDegreeExceeded { node: node.id.clone(), count });
        }
    }
    Ok(())
}

/// Builds a petgraph view of the flow; edges with unknown endpoints are skipped.
fn to_digraph<'a>(
    nodes: &'a [Node],
    edges: &'a [Edge],
) -> (DiGraph<&'a NodeId, ()>, HashMap<&'a NodeId, NodeIndex>) {
    let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
    let mut index_of = HashMap::with_capacity(nodes.len());
    for node in nodes {
        index_of.insert(&node.id, graph.add_node(&node.id));
    }
    for edge in edges {
        if let (Some(&s), Some(&t)) = (index_of.get(&edge.source), index_of.get(&edge.target)) {
            graph.add_edge(s, t, ());
        }
    }
    (graph, index_of)
}

/// Nodes with no incoming edge, in node order. A self-loop counts as incoming.
pub fn entry_points(nodes: &[Node], edges: &[Edge]) -> Vec<NodeId> {
    let (graph, index_of) = to_digraph(nodes, edges);
    nodes
        .iter()
        .filter(|n| {
            index_of
                .get(&n.id)
                .is_some_and(|&ix| graph.neighbors_directed(ix, Incoming).next().is_none())
        })
        .map(|n| n.id.clone())
        .collect()
}

/// Nodes that cannot be reached from the single entry point.
///
/// Not a save blocker: a cycle hanging off nowhere still has no root of its
/// own. Returns an empty list when the entry point is ambiguous or missing.
pub fn unreachable_nodes(graph: &Graph) -> Vec<NodeId> {
    let nodes = graph.nodes();
    let edges = graph.edges();
    let roots = entry_points(nodes, edges);
    let [root] = roots.as_slice() else {
        return Vec::new();
    };

    let (digraph, index_of) = to_digraph(nodes, edges);
    let Some(&start) = index_of.get(root) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut dfs = Dfs::new(&digraph, start);
    while let Some(ix) = dfs.next(&digraph) {
        seen.insert(ix);
    }

    nodes
        .iter()
        .filter(|n| index_of.get(&n.id).is_some_and(|ix| !seen.contains(ix)))
        .map(|n| n.id.clone())
        .collect()
}
