//! Workflow node types.
//!
//! Nodes are authored by the workflow designer and stored as JSON. Each node
//! carries a designer-assigned string id, a type string that selects the
//! registered runtime implementation, and a data blob with title and
//! type-specific configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Designer-assigned identifier for a node within a workflow.
///
/// Unlike the ULID-backed domain ids, node ids come from the stored
/// definition and are opaque strings; edges reference nodes by these ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wraps a designer-assigned id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Ports of a loop construct.
///
/// The body port is the output whose edges feed the nodes "inside" the loop;
/// the loop resolver matches edges against it when unwinding nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopPorts {
    /// Output port that feeds the loop body.
    pub body_port: String,
}

/// Captured test-run output attached to a node by the designer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTestResult {
    /// Present when the node is a loop construct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_context: Option<LoopPorts>,
    /// Sample outputs captured during a test run.
    #[serde(default)]
    pub outputs: JsonValue,
}

/// The data blob carried by a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    /// Human-readable title, unique enough for explicit routing by name.
    pub title: String,
    /// Type-specific configuration, opaque to the engine.
    #[serde(default)]
    pub config: JsonValue,
    /// Test-run metadata, if the designer has test-executed the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_result: Option<NodeTestResult>,
}

/// A workflow node as authored by the designer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Designer-assigned identifier, referenced by edges.
    pub id: NodeId,
    /// Type string selecting the registered runtime implementation.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Title, configuration, and test metadata.
    pub data: NodeData,
}

impl Node {
    /// Creates a node with the given id, type, and title.
    #[must_use]
    pub fn new(
        id: impl Into<NodeId>,
        node_type: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: NodeData {
                title: title.into(),
                config: JsonValue::Null,
                test_result: None,
            },
        }
    }

    /// Sets the node configuration.
    #[must_use]
    pub fn with_config(mut self, config: JsonValue) -> Self {
        self.data.config = config;
        self
    }

    /// Marks this node as a loop construct with the given body port.
    #[must_use]
    pub fn as_loop(mut self, body_port: impl Into<String>) -> Self {
        let test_result = self.data.test_result.get_or_insert_with(Default::default);
        test_result.loop_context = Some(LoopPorts {
            body_port: body_port.into(),
        });
        self
    }

    /// Returns the node title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.data.title
    }

    /// Returns the loop ports if this node is a loop construct.
    #[must_use]
    pub fn loop_ports(&self) -> Option<&LoopPorts> {
        self.data.test_result.as_ref()?.loop_context.as_ref()
    }
}
