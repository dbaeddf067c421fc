//! Execution graph built from designer-authored node and edge lists.
//!
//! The graph is derived, never stored: forward and reverse adjacency plus
//! in-degree counts, with trigger nodes being the zero-in-degree set.
//!
//! Malformed input degrades rather than fails: edges referencing unknown
//! nodes and duplicate edges are dropped with a warning so a workflow stays
//! runnable with whatever valid structure remains.

use crate::edge::Edge;
use crate::node::{Node, NodeId};
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

/// Derived adjacency index over a workflow's nodes and edges.
///
/// Edge vectors preserve the input order, which the router relies on for its
/// deterministic first-edge fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionGraph {
    forward: HashMap<NodeId, Vec<Edge>>,
    reverse: HashMap<NodeId, Vec<Edge>>,
    in_degree: HashMap<NodeId, usize>,
    trigger_nodes: Vec<NodeId>,
}

impl ExecutionGraph {
    /// Builds the adjacency index from node and edge lists.
    ///
    /// Never fails: edges with unknown endpoints and duplicates (same
    /// source, target, and label) are skipped with a warning.
    #[must_use]
    pub fn build(nodes: &[Node], edges: &[Edge]) -> Self {
        let mut forward: HashMap<NodeId, Vec<Edge>> = HashMap::new();
        let mut reverse: HashMap<NodeId, Vec<Edge>> = HashMap::new();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();

        for node in nodes {
            forward.entry(node.id.clone()).or_default();
            reverse.entry(node.id.clone()).or_default();
            in_degree.entry(node.id.clone()).or_insert(0);
        }

        let known: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        let mut seen = HashSet::new();

        for edge in edges {
            if !known.contains(&edge.source) || !known.contains(&edge.target) {
                tracing::warn!(
                    edge_id = %edge.id,
                    source = %edge.source,
                    target = %edge.target,
                    "edge references an unknown node, skipping"
                );
                continue;
            }

            if !seen.insert(edge.dedup_key()) {
                tracing::warn!(
                    edge_id = %edge.id,
                    source = %edge.source,
                    target = %edge.target,
                    "duplicate edge, skipping"
                );
                continue;
            }

            forward
                .entry(edge.source.clone())
                .or_default()
                .push(edge.clone());
            reverse
                .entry(edge.target.clone())
                .or_default()
                .push(edge.clone());
            *in_degree.entry(edge.target.clone()).or_insert(0) += 1;
        }

        // Trigger nodes in node-list order so the fallback start is stable.
        let trigger_nodes = nodes
            .iter()
            .filter(|n| in_degree.get(&n.id).copied() == Some(0))
            .map(|n| n.id.clone())
            .collect();

        Self {
            forward,
            reverse,
            in_degree,
            trigger_nodes,
        }
    }

    /// Outgoing edges of a node, in input order.
    #[must_use]
    pub fn outgoing(&self, node_id: &NodeId) -> &[Edge] {
        self.forward.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Incoming edges of a node, in input order.
    #[must_use]
    pub fn incoming(&self, node_id: &NodeId) -> &[Edge] {
        self.reverse.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of incoming edges retained for a node.
    #[must_use]
    pub fn in_degree(&self, node_id: &NodeId) -> usize {
        self.in_degree.get(node_id).copied().unwrap_or(0)
    }

    /// Nodes with no incoming edges, in node-list order.
    #[must_use]
    pub fn trigger_nodes(&self) -> &[NodeId] {
        &self.trigger_nodes
    }

    /// Number of nodes indexed.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.forward.len()
    }

    /// Number of edges retained after validation and deduplication.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(Vec::len).sum()
    }

    /// Whether the retained edges form a cycle.
    ///
    /// Loop constructs route iteration through ports rather than back-edges,
    /// so a cycle here is a structural diagnostic worth surfacing.
    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        let mut graph = DiGraph::<(), ()>::new();
        let mut indices = HashMap::new();

        for id in self.forward.keys() {
            indices.insert(id.clone(), graph.add_node(()));
        }
        for (source, edges) in &self.forward {
            for edge in edges {
                graph.add_edge(indices[source], indices[&edge.target], ());
            }
        }

        petgraph::algo::is_cyclic_directed(&graph)
    }
}
