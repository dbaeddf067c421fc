//! Type-string registry of node implementations.
//!
//! Adding a node type means registering an implementation here; the router
//! and runner never grow per-type branches.

use crate::runtime::{NodeDefinition, WorkflowNode};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry mapping node type strings to their implementations.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn WorkflowNode>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an implementation under its definition id.
    ///
    /// A later registration for the same type string replaces the earlier
    /// one.
    pub fn register(&mut self, node: Arc<dyn WorkflowNode>) {
        let node_type = node.definition().id;
        if self.nodes.insert(node_type.clone(), node).is_some() {
            tracing::debug!(node_type, "node implementation replaced");
        }
    }

    /// Returns the implementation for a type string.
    #[must_use]
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn WorkflowNode>> {
        self.nodes.get(node_type).cloned()
    }

    /// Whether a type string has a registered implementation.
    #[must_use]
    pub fn contains(&self, node_type: &str) -> bool {
        self.nodes.contains_key(node_type)
    }

    /// Number of registered node types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Definitions of all registered node types.
    #[must_use]
    pub fn definitions(&self) -> Vec<NodeDefinition> {
        let mut definitions: Vec<_> = self.nodes.values().map(|n| n.definition()).collect();
        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{
        NodeCategory, NodeExecutionResult, PortDefinition, RunContext,
    };
    use async_trait::async_trait;

    struct NoopNode {
        id: &'static str,
    }

    #[async_trait]
    impl WorkflowNode for NoopNode {
        fn definition(&self) -> NodeDefinition {
            NodeDefinition {
                id: self.id.to_string(),
                title: "Noop".to_string(),
                description: "Does nothing".to_string(),
                icon: "noop".to_string(),
                category: NodeCategory::Action,
                ports: vec![PortDefinition::output("output", 0)],
                form: serde_json::Value::Null,
                keywords: Vec::new(),
                activation: None,
            }
        }

        async fn run(&self, _ctx: &RunContext) -> NodeExecutionResult {
            NodeExecutionResult::success(serde_json::Map::new())
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(NoopNode { id: "core.noop" }));

        assert!(registry.contains("core.noop"));
        assert!(registry.get("core.noop").is_some());
        assert!(registry.get("core.unknown").is_none());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(NoopNode { id: "core.noop" }));
        registry.register(Arc::new(NoopNode { id: "core.noop" }));

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn definitions_are_sorted_by_id() {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(NoopNode { id: "core.zeta" }));
        registry.register(Arc::new(NoopNode { id: "core.alpha" }));

        let definitions = registry.definitions();
        assert_eq!(definitions[0].id, "core.alpha");
        assert_eq!(definitions[1].id, "core.zeta");
    }
}
