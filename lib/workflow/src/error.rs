//! Error types for the workflow crate.
//!
//! Structural graph problems never surface here: the graph model degrades
//! and logs instead. These errors cover the cases that are fatal for a
//! single execution or activation request.

use crate::node::NodeId;
use std::fmt;

/// Errors from interpreting or executing a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// An explicitly requested trigger node matched nothing.
    TriggerNodeNotFound { requested: String },
    /// The definition contains no nodes.
    EmptyWorkflow,
    /// A node's type string has no registered implementation.
    NodeTypeNotRegistered { node_type: String },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerNodeNotFound { requested } => {
                write!(f, "trigger node not found: {requested}")
            }
            Self::EmptyWorkflow => write!(f, "workflow has no nodes"),
            Self::NodeTypeNotRegistered { node_type } => {
                write!(f, "node type not registered: {node_type}")
            }
        }
    }
}

impl std::error::Error for WorkflowError {}

/// Errors from the trigger activation lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    /// The activation state store failed.
    StoreFailed { reason: String },
    /// A node's activation hook failed.
    HookFailed { node_id: NodeId, reason: String },
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StoreFailed { reason } => {
                write!(f, "activation state store failed: {reason}")
            }
            Self::HookFailed { node_id, reason } => {
                write!(f, "activation hook failed for node {node_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for ActivationError {}
