//! Workflow definition types.
//!
//! A definition is the stored form of an automation: metadata plus the
//! designer-authored node and edge lists. The execution graph is derived
//! from it on demand, never persisted.

use crate::edge::Edge;
use crate::graph::ExecutionGraph;
use crate::node::{Node, NodeId};
use chrono::{DateTime, Utc};
use copper_relay_core::WorkflowId;
use serde::{Deserialize, Serialize};

/// A stored workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Unique identifier.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Designer-authored nodes.
    pub nodes: Vec<Node>,
    /// Designer-authored edges.
    pub edges: Vec<Edge>,
    /// Whether the workflow is published (triggers active).
    pub published: bool,
    /// When this definition was created.
    pub created_at: DateTime<Utc>,
    /// When this definition was last updated.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Creates an empty, unpublished definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            published: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a node, returning its id.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        self.updated_at = Utc::now();
        id
    }

    /// Appends an edge.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
        self.updated_at = Utc::now();
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Returns a node by title.
    #[must_use]
    pub fn node_by_title(&self, title: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.data.title == title)
    }

    /// Marks the workflow published.
    pub fn publish(&mut self) {
        self.published = true;
        self.updated_at = Utc::now();
    }

    /// Marks the workflow unpublished.
    pub fn unpublish(&mut self) {
        self.published = false;
        self.updated_at = Utc::now();
    }

    /// Derives the execution graph from the current node and edge lists.
    #[must_use]
    pub fn graph(&self) -> ExecutionGraph {
        ExecutionGraph::build(&self.nodes, &self.edges)
    }

    /// Reports structural problems without failing the definition.
    ///
    /// The engine runs whatever valid structure remains; diagnostics exist
    /// so the designer can be told what was dropped or looks suspect.
    #[must_use]
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if self.nodes.is_empty() {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::NoNodes,
                message: "workflow has no nodes".to_string(),
            });
            return diagnostics;
        }

        let known: std::collections::HashSet<&NodeId> = self.nodes.iter().map(|n| &n.id).collect();
        let mut seen = std::collections::HashSet::new();

        for edge in &self.edges {
            if !known.contains(&edge.source) || !known.contains(&edge.target) {
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::DanglingEdge,
                    message: format!(
                        "edge {} references an unknown node ({} -> {})",
                        edge.id, edge.source, edge.target
                    ),
                });
                continue;
            }
            if !seen.insert(edge.dedup_key()) {
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::DuplicateEdge,
                    message: format!(
                        "edge {} duplicates an earlier edge ({} -> {})",
                        edge.id, edge.source, edge.target
                    ),
                });
            }
        }

        if self.graph().is_cyclic() {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::CycleDetected,
                message: "workflow edges form a cycle".to_string(),
            });
        }

        diagnostics
    }
}

/// Kind of a structural diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// An edge references a node that does not exist.
    DanglingEdge,
    /// An edge repeats an earlier source/target/label combination.
    DuplicateEdge,
    /// The retained edges form a cycle.
    CycleDetected,
    /// The definition has no nodes.
    NoNodes,
}

/// A structural problem found in a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Problem kind.
    pub kind: DiagnosticKind,
    /// Human-readable description.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_toggles_state() {
        let mut workflow = WorkflowDefinition::new("Daily digest");
        assert!(!workflow.published);

        workflow.publish();
        assert!(workflow.published);

        workflow.unpublish();
        assert!(!workflow.published);
    }

    #[test]
    fn lookup_by_id_and_title() {
        let mut workflow = WorkflowDefinition::new("Lookup");
        workflow.add_node(Node::new("n1", "core.noop", "First step"));

        assert!(workflow.node(&NodeId::from("n1")).is_some());
        assert!(workflow.node_by_title("First step").is_some());
        assert!(workflow.node_by_title("Missing").is_none());
    }

    #[test]
    fn validate_reports_dangling_and_duplicate_edges() {
        let mut workflow = WorkflowDefinition::new("Problems");
        workflow.add_node(Node::new("a", "core.noop", "A"));
        workflow.add_node(Node::new("b", "core.noop", "B"));
        workflow.add_edge(Edge::new("e1", "a", "b"));
        workflow.add_edge(Edge::new("e2", "a", "b"));
        workflow.add_edge(Edge::new("e3", "a", "ghost"));

        let diagnostics = workflow.validate();
        let kinds: Vec<_> = diagnostics.iter().map(|d| d.kind).collect();

        assert!(kinds.contains(&DiagnosticKind::DuplicateEdge));
        assert!(kinds.contains(&DiagnosticKind::DanglingEdge));
        assert!(!kinds.contains(&DiagnosticKind::CycleDetected));
    }

    #[test]
    fn validate_reports_cycles() {
        let mut workflow = WorkflowDefinition::new("Cycle");
        workflow.add_node(Node::new("a", "core.noop", "A"));
        workflow.add_node(Node::new("b", "core.noop", "B"));
        workflow.add_edge(Edge::new("e1", "a", "b"));
        workflow.add_edge(Edge::new("e2", "b", "a"));

        let diagnostics = workflow.validate();
        assert!(
            diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::CycleDetected)
        );
    }

    #[test]
    fn empty_definition_reports_no_nodes() {
        let workflow = WorkflowDefinition::new("Empty");
        let diagnostics = workflow.validate();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::NoNodes);
    }

    #[test]
    fn definition_serde_roundtrip() {
        let mut workflow = WorkflowDefinition::new("Roundtrip");
        workflow.add_node(Node::new("a", "core.noop", "A"));
        workflow.add_edge(Edge::new("e1", "a", "a"));

        let json = serde_json::to_string(&workflow).expect("serialize");
        let parsed: WorkflowDefinition = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(workflow, parsed);
    }
}
