//! Edge types for workflow graphs.
//!
//! Edges connect nodes by designer-assigned id. An edge may bind to a named
//! output port on its source node, which is how conditional branches pick
//! their successor.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Designer-assigned edge identifier.
    pub id: String,
    /// Source node id.
    pub source: NodeId,
    /// Target node id.
    pub target: NodeId,
    /// Optional display label; part of the duplicate-detection key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Output port on the source node this edge is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port_id: Option<String>,
}

impl Edge {
    /// Creates an edge between two nodes.
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            label: None,
            source_port_id: None,
        }
    }

    /// Sets the display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Binds this edge to an output port on the source node.
    #[must_use]
    pub fn with_source_port(mut self, port: impl Into<String>) -> Self {
        self.source_port_id = Some(port.into());
        self
    }

    /// Key used to collapse duplicate edges.
    #[must_use]
    pub(crate) fn dedup_key(&self) -> (NodeId, NodeId, Option<String>) {
        (self.source.clone(), self.target.clone(), self.label.clone())
    }
}
