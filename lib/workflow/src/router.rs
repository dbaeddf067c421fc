//! Execution routing.
//!
//! Given a node's execution result, decides where the run goes next:
//! explicit routing by title first, then edge-based routing (terminal,
//! linear, or port-based conditional). Routing ambiguity is never fatal;
//! the fallback is the first outgoing edge, which is deterministic because
//! the graph preserves edge input order.

use crate::error::WorkflowError;
use crate::graph::ExecutionGraph;
use crate::node::{Node, NodeId};
use crate::runtime::NodeExecutionResult;

/// Resolves the node a run starts from.
///
/// With an explicit request (webhook delivery naming its trigger), a node
/// matches by title, by id, or by being a trigger node. Without one, the
/// first trigger node wins, falling back to the first node overall.
///
/// # Errors
///
/// `TriggerNodeNotFound` when an explicit request matches nothing;
/// `EmptyWorkflow` when there are no nodes at all.
pub fn determine_start_node(
    nodes: &[Node],
    trigger_nodes: &[NodeId],
    explicit: Option<&str>,
) -> Result<NodeId, WorkflowError> {
    if let Some(requested) = explicit {
        let found = nodes
            .iter()
            .find(|n| n.data.title == requested)
            .or_else(|| nodes.iter().find(|n| n.id.as_str() == requested))
            .or_else(|| nodes.iter().find(|n| trigger_nodes.contains(&n.id)));

        return match found {
            Some(node) => {
                tracing::debug!(node_id = %node.id, requested, "resolved explicit start node");
                Ok(node.id.clone())
            }
            None => Err(WorkflowError::TriggerNodeNotFound {
                requested: requested.to_string(),
            }),
        };
    }

    trigger_nodes
        .first()
        .cloned()
        .or_else(|| nodes.first().map(|n| n.id.clone()))
        .ok_or(WorkflowError::EmptyWorkflow)
}

/// Decides the next node after `current` produced `result`.
///
/// Resolution order, first match wins:
///
/// 1. explicit `next_node` routing by title (warn and fall through when the
///    title matches nothing)
/// 2. terminal: no outgoing edges ends the branch
/// 3. linear: a single outgoing edge is followed unconditionally
/// 4. conditional: two or more edges resolve through the result's `port`
///    output, falling back to the first edge
#[must_use]
pub fn next_node(
    current: &NodeId,
    result: &NodeExecutionResult,
    graph: &ExecutionGraph,
    nodes: &[Node],
) -> Option<NodeId> {
    if let Some(title) = &result.next_node {
        match nodes.iter().find(|n| &n.data.title == title) {
            Some(node) => {
                tracing::debug!(from = %current, to = %node.id, title, "explicit routing");
                return Some(node.id.clone());
            }
            None => {
                tracing::warn!(
                    from = %current,
                    title,
                    "explicit next node not found, falling back to edge routing"
                );
            }
        }
    }

    let outgoing = graph.outgoing(current);
    match outgoing {
        [] => None,
        [only] => Some(only.target.clone()),
        _ => Some(resolve_port_edge(current, result, graph)),
    }
}

/// Port-based resolution among multiple outgoing edges.
///
/// Matches the result's `port` output against edge `sourcePortId` bindings
/// case-insensitively. No port or no match falls back to the first edge;
/// this is defined behavior for multi-edge nodes, not an error.
fn resolve_port_edge(
    current: &NodeId,
    result: &NodeExecutionResult,
    graph: &ExecutionGraph,
) -> NodeId {
    let outgoing = graph.outgoing(current);

    if let Some(port) = result.outputs.get("port").and_then(|v| v.as_str()) {
        let matched = outgoing.iter().find(|edge| {
            edge.source_port_id
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(port))
        });

        if let Some(edge) = matched {
            tracing::debug!(from = %current, port, to = %edge.target, "port routing");
            return edge.target.clone();
        }

        tracing::warn!(
            from = %current,
            port,
            "no edge matches output port, falling back to first edge"
        );
    } else {
        tracing::warn!(
            from = %current,
            "multiple outgoing edges but no output port, falling back to first edge"
        );
    }

    outgoing[0].target.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::runtime::NodeExecutionResult;

    fn node(id: &str, title: &str) -> Node {
        Node::new(id, "core.noop", title)
    }

    fn success() -> NodeExecutionResult {
        NodeExecutionResult::success(serde_json::Map::new())
    }

    #[test]
    fn start_is_first_trigger_node() {
        let nodes = vec![node("a", "A"), node("b", "B"), node("c", "C")];
        let edges = vec![Edge::new("e1", "b", "c")];
        let graph = ExecutionGraph::build(&nodes, &edges);

        let start = determine_start_node(&nodes, graph.trigger_nodes(), None).expect("start");
        assert_eq!(start.as_str(), "a");
    }

    #[test]
    fn start_falls_back_to_first_node_without_triggers() {
        // All nodes sit on a cycle, so none has in-degree zero.
        let nodes = vec![node("a", "A"), node("b", "B")];
        let edges = vec![Edge::new("e1", "a", "b"), Edge::new("e2", "b", "a")];
        let graph = ExecutionGraph::build(&nodes, &edges);

        assert!(graph.trigger_nodes().is_empty());
        let start = determine_start_node(&nodes, graph.trigger_nodes(), None).expect("start");
        assert_eq!(start.as_str(), "a");
    }

    #[test]
    fn explicit_start_matches_title_then_id() {
        let nodes = vec![node("a", "Webhook received"), node("b", "Send email")];
        let edges = vec![Edge::new("e1", "a", "b")];
        let graph = ExecutionGraph::build(&nodes, &edges);

        let by_title =
            determine_start_node(&nodes, graph.trigger_nodes(), Some("Webhook received"))
                .expect("by title");
        assert_eq!(by_title.as_str(), "a");

        let by_id =
            determine_start_node(&nodes, graph.trigger_nodes(), Some("b")).expect("by id");
        assert_eq!(by_id.as_str(), "b");
    }

    #[test]
    fn explicit_start_not_found_is_fatal() {
        // A cycle leaves no trigger nodes to satisfy the trigger-type match.
        let nodes = vec![node("a", "A"), node("b", "B")];
        let edges = vec![Edge::new("e1", "a", "b"), Edge::new("e2", "b", "a")];
        let graph = ExecutionGraph::build(&nodes, &edges);

        let result = determine_start_node(&nodes, graph.trigger_nodes(), Some("Missing"));
        assert_eq!(
            result,
            Err(WorkflowError::TriggerNodeNotFound {
                requested: "Missing".to_string()
            })
        );
    }

    #[test]
    fn empty_workflow_has_no_start() {
        let result = determine_start_node(&[], &[], None);
        assert_eq!(result, Err(WorkflowError::EmptyWorkflow));
    }

    #[test]
    fn terminal_node_ends_branch() {
        let nodes = vec![node("a", "A"), node("b", "B")];
        let edges = vec![Edge::new("e1", "a", "b")];
        let graph = ExecutionGraph::build(&nodes, &edges);

        assert_eq!(
            next_node(&NodeId::from("b"), &success(), &graph, &nodes),
            None
        );
    }

    #[test]
    fn linear_edge_is_followed_unconditionally() {
        let nodes = vec![node("a", "A"), node("b", "B")];
        let edges = vec![Edge::new("e1", "a", "b")];
        let graph = ExecutionGraph::build(&nodes, &edges);

        // Even an error result follows the single edge; halting is the
        // runner's decision.
        let result = NodeExecutionResult::error("boom");
        assert_eq!(
            next_node(&NodeId::from("a"), &result, &graph, &nodes),
            Some(NodeId::from("b"))
        );
    }

    #[test]
    fn port_routing_selects_matching_edge() {
        let nodes = vec![node("a", "A"), node("b", "B"), node("c", "C")];
        let edges = vec![
            Edge::new("e1", "a", "b").with_source_port("true"),
            Edge::new("e2", "a", "c").with_source_port("false"),
        ];
        let graph = ExecutionGraph::build(&nodes, &edges);

        let true_result = success().with_port("true");
        assert_eq!(
            next_node(&NodeId::from("a"), &true_result, &graph, &nodes),
            Some(NodeId::from("b"))
        );

        let false_result = success().with_port("false");
        assert_eq!(
            next_node(&NodeId::from("a"), &false_result, &graph, &nodes),
            Some(NodeId::from("c"))
        );
    }

    #[test]
    fn port_match_is_case_insensitive() {
        let nodes = vec![node("a", "A"), node("b", "B"), node("c", "C")];
        let edges = vec![
            Edge::new("e1", "a", "b").with_source_port("True"),
            Edge::new("e2", "a", "c").with_source_port("False"),
        ];
        let graph = ExecutionGraph::build(&nodes, &edges);

        let result = success().with_port("FALSE");
        assert_eq!(
            next_node(&NodeId::from("a"), &result, &graph, &nodes),
            Some(NodeId::from("c"))
        );
    }

    #[test]
    fn missing_port_falls_back_to_first_edge() {
        let nodes = vec![node("a", "A"), node("b", "B"), node("c", "C")];
        let edges = vec![
            Edge::new("e1", "a", "b").with_source_port("true"),
            Edge::new("e2", "a", "c").with_source_port("false"),
        ];
        let graph = ExecutionGraph::build(&nodes, &edges);

        assert_eq!(
            next_node(&NodeId::from("a"), &success(), &graph, &nodes),
            Some(NodeId::from("b"))
        );
    }

    #[test]
    fn unmatched_port_falls_back_to_first_edge() {
        let nodes = vec![node("a", "A"), node("b", "B"), node("c", "C")];
        let edges = vec![
            Edge::new("e1", "a", "b").with_source_port("true"),
            Edge::new("e2", "a", "c").with_source_port("false"),
        ];
        let graph = ExecutionGraph::build(&nodes, &edges);

        let result = success().with_port("neither");
        assert_eq!(
            next_node(&NodeId::from("a"), &result, &graph, &nodes),
            Some(NodeId::from("b"))
        );
    }

    #[test]
    fn explicit_routing_wins_over_edges() {
        let nodes = vec![node("a", "A"), node("b", "B"), node("c", "Jump target")];
        let edges = vec![Edge::new("e1", "a", "b")];
        let graph = ExecutionGraph::build(&nodes, &edges);

        let result = success().with_next_node("Jump target");
        assert_eq!(
            next_node(&NodeId::from("a"), &result, &graph, &nodes),
            Some(NodeId::from("c"))
        );
    }

    #[test]
    fn unknown_explicit_route_falls_through_to_edges() {
        let nodes = vec![node("a", "A"), node("b", "B")];
        let edges = vec![Edge::new("e1", "a", "b")];
        let graph = ExecutionGraph::build(&nodes, &edges);

        let result = success().with_next_node("No such title");
        assert_eq!(
            next_node(&NodeId::from("a"), &result, &graph, &nodes),
            Some(NodeId::from("b"))
        );
    }
}
