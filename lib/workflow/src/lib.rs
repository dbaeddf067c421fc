//! Workflow execution engine for the copper-relay platform.
//!
//! This crate interprets externally-authored workflow definitions, including:
//!
//! - **Graph Model**: forward/reverse adjacency and in-degree built from
//!   designer-authored node and edge lists, tolerant of malformed input
//! - **Execution Router**: decides the next node from a node's result,
//!   including port-based conditional branching
//! - **Loop Resolver**: finds the enclosing loop constructs of a node,
//!   outermost first
//! - **Node Runtime Contract**: the uniform lifecycle every node type
//!   implements, selected through a type-string registry
//! - **Runner**: single-stepping executor with bounded node timeouts
//! - **Trigger Activation**: publish/unpublish/heartbeat sequencing for
//!   triggers that register external subscriptions

pub mod activation;
pub mod definition;
pub mod edge;
pub mod error;
pub mod graph;
pub mod loops;
pub mod node;
pub mod registry;
pub mod router;
pub mod runner;
pub mod runtime;

pub use activation::{ActivationManager, ActivationStateStore, InMemoryActivationStateStore};
pub use definition::{Diagnostic, DiagnosticKind, WorkflowDefinition};
pub use edge::Edge;
pub use error::{ActivationError, WorkflowError};
pub use graph::ExecutionGraph;
pub use loops::{find_parent_loops, find_parent_nodes, ParentLoop};
pub use node::{LoopPorts, Node, NodeData, NodeId, NodeTestResult};
pub use registry::NodeRegistry;
pub use router::{determine_start_node, next_node};
pub use runner::{
    NodeExecutionRecord, RunOptions, RunRecord, WorkflowRunStatus, WorkflowRunner,
};
pub use runtime::{
    ActivationContext, ActivationState, Integration, IntegrationAccessor, LogEntry, LogLevel,
    NodeCategory, NodeDefinition, NodeError, NodeExecutionResult, NoIntegrations, OptionItem,
    PortDefinition, PortDirection, RunContext, RunMetrics, RunStatus, TriggerActivationKind,
    ValidationIssue, ValidationOutcome, VariableDefinition, VariableKind, WorkflowNode,
};
