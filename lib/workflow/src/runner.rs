//! Workflow runner.
//!
//! Executes one workflow run, single-stepping through the graph: resolve
//! the start node, execute it through the registry, feed the result to the
//! router, repeat until a terminal node. Node runs are awaited under a
//! bounded timeout so a stuck integration resolves to an error result
//! instead of hanging the run.
//!
//! Run history records per-node status, outputs, logs, and metrics,
//! including failures.

use crate::definition::WorkflowDefinition;
use crate::error::WorkflowError;
use crate::graph::ExecutionGraph;
use crate::node::{Node, NodeId};
use crate::registry::NodeRegistry;
use crate::router::{determine_start_node, next_node};
use crate::runtime::{
    IntegrationAccessor, LogEntry, NodeError, NodeExecutionResult, RunContext, RunMetrics,
    RunStatus,
};
use chrono::{DateTime, Utc};
use copper_relay_core::{NodeExecutionId, WorkflowId, WorkflowRunId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    /// The run is executing.
    Running,
    /// The run reached a terminal node.
    Completed,
    /// The run stopped on a failure.
    Failed,
}

/// Options for a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Explicit start node (title or id), used when an external event
    /// resumes execution from its trigger node.
    pub trigger_node: Option<String>,
    /// Payload from the external event that started the run.
    pub trigger_data: Option<JsonValue>,
    /// Requests side-effect-free execution where node types support it.
    pub test_mode: bool,
    /// Stop the run when a node reports an error status.
    pub halt_on_error: bool,
    /// Upper bound on a single node run.
    pub node_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            trigger_node: None,
            trigger_data: None,
            test_mode: false,
            halt_on_error: true,
            node_timeout: Duration::from_secs(30),
        }
    }
}

/// Execution record for a single node within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionRecord {
    /// Unique identifier for this record.
    pub id: NodeExecutionId,
    /// The node that ran.
    pub node_id: NodeId,
    /// The node's title at execution time.
    pub node_title: String,
    /// Outcome status.
    pub status: RunStatus,
    /// Outputs produced.
    pub outputs: serde_json::Map<String, JsonValue>,
    /// Error details, if the node failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    /// Logs accumulated during the run.
    pub logs: Vec<LogEntry>,
    /// Metrics reported by the node.
    pub metrics: RunMetrics,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub finished_at: DateTime<Utc>,
}

/// Record of a complete workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Unique identifier for this run.
    pub id: WorkflowRunId,
    /// The workflow that ran.
    pub workflow_id: WorkflowId,
    /// Overall status.
    pub status: WorkflowRunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-node execution records, in execution order.
    pub node_results: Vec<NodeExecutionRecord>,
    /// Run-level error, if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    fn new(workflow_id: WorkflowId) -> Self {
        Self {
            id: WorkflowRunId::new(),
            workflow_id,
            status: WorkflowRunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            node_results: Vec::new(),
            error: None,
        }
    }

    fn complete(&mut self) {
        self.status = WorkflowRunStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    fn fail(&mut self, error: impl Into<String>) {
        self.status = WorkflowRunStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
    }
}

/// Single-stepping workflow executor.
pub struct WorkflowRunner {
    registry: Arc<NodeRegistry>,
    integrations: Arc<dyn IntegrationAccessor>,
}

impl WorkflowRunner {
    /// Creates a runner over the given registry and integration accessor.
    pub fn new(registry: Arc<NodeRegistry>, integrations: Arc<dyn IntegrationAccessor>) -> Self {
        Self {
            registry,
            integrations,
        }
    }

    /// Executes one run of the given workflow.
    ///
    /// Node failures do not surface as errors here; they are captured in
    /// the run record (and stop the run when `halt_on_error` is set).
    ///
    /// # Errors
    ///
    /// Fails only when the execution request itself is unusable: an empty
    /// workflow, or an explicit trigger that matches nothing.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        options: RunOptions,
    ) -> Result<RunRecord, WorkflowError> {
        if workflow.nodes.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }

        let graph = ExecutionGraph::build(&workflow.nodes, &workflow.edges);
        let node_map: HashMap<&NodeId, &Node> =
            workflow.nodes.iter().map(|n| (&n.id, n)).collect();

        let mut current = determine_start_node(
            &workflow.nodes,
            graph.trigger_nodes(),
            options.trigger_node.as_deref(),
        )?;

        let mut record = RunRecord::new(workflow.id);
        let mut executed: HashSet<NodeId> = HashSet::new();
        let mut outputs_by_title: serde_json::Map<String, JsonValue> = serde_json::Map::new();

        // Guard against runaway graphs; loop constructs revisit nodes
        // through ports, not by re-entering the walk.
        let max_iterations = workflow.nodes.len() * 10;
        let mut iterations = 0usize;

        loop {
            iterations += 1;
            if iterations > max_iterations {
                tracing::warn!(run_id = %record.id, max_iterations, "iteration cap exceeded");
                record.fail(format!("exceeded {max_iterations} iterations"));
                return Ok(record);
            }

            if executed.contains(&current) {
                tracing::warn!(run_id = %record.id, node_id = %current, "cycle detected, stopping");
                break;
            }

            let Some(node) = node_map.get(&current) else {
                tracing::warn!(run_id = %record.id, node_id = %current, "routed to unknown node");
                break;
            };
            executed.insert(current.clone());

            let is_trigger = graph.trigger_nodes().contains(&current);
            let started_at = Utc::now();
            let result = self
                .execute_node(workflow.id, record.id, node, is_trigger, &outputs_by_title, &options)
                .await;
            let finished_at = Utc::now();

            outputs_by_title.insert(
                node.data.title.clone(),
                JsonValue::Object(result.outputs.clone()),
            );

            record.node_results.push(NodeExecutionRecord {
                id: NodeExecutionId::new(),
                node_id: node.id.clone(),
                node_title: node.data.title.clone(),
                status: result.status,
                outputs: result.outputs.clone(),
                error: result.error.clone(),
                logs: result.logs.clone(),
                metrics: result.metrics.clone(),
                started_at,
                finished_at,
            });

            if result.is_error() && options.halt_on_error {
                let reason = result
                    .error
                    .as_ref()
                    .map_or_else(|| "node failed".to_string(), |e| e.message.clone());
                tracing::warn!(run_id = %record.id, node_id = %current, reason, "run halted");
                record.fail(format!("node '{}' failed: {reason}", node.data.title));
                return Ok(record);
            }

            match next_node(&current, &result, &graph, &workflow.nodes) {
                Some(next) => current = next,
                None => break,
            }
        }

        record.complete();
        tracing::debug!(
            run_id = %record.id,
            nodes_executed = record.node_results.len(),
            "run completed"
        );
        Ok(record)
    }

    /// Executes one node, capturing every failure path into the result.
    async fn execute_node(
        &self,
        workflow_id: WorkflowId,
        run_id: WorkflowRunId,
        node: &Node,
        is_trigger: bool,
        inputs: &serde_json::Map<String, JsonValue>,
        options: &RunOptions,
    ) -> NodeExecutionResult {
        let Some(implementation) = self.registry.get(&node.node_type) else {
            // Unregistered triggers still start the run: they complete with
            // the trigger payload as output. Anything else is a failure.
            if is_trigger {
                let mut outputs = serde_json::Map::new();
                if let Some(data) = &options.trigger_data {
                    outputs.insert("trigger".to_string(), data.clone());
                }
                return NodeExecutionResult::success(outputs);
            }
            let error = WorkflowError::NodeTypeNotRegistered {
                node_type: node.node_type.clone(),
            };
            return NodeExecutionResult::error(error.to_string());
        };

        let ctx = RunContext {
            workflow_id,
            run_id,
            node_id: node.id.clone(),
            config: node.data.config.clone(),
            inputs: inputs.clone(),
            trigger_data: options.trigger_data.clone(),
            test_mode: options.test_mode,
            integrations: Arc::clone(&self.integrations),
        };

        let started = std::time::Instant::now();
        match tokio::time::timeout(options.node_timeout, implementation.run(&ctx)).await {
            Ok(result) => result,
            Err(_) => {
                let mut result = NodeExecutionResult::error(format!(
                    "node timed out after {}ms",
                    options.node_timeout.as_millis()
                ));
                result.metrics = RunMetrics {
                    execution_time_ms: started.elapsed().as_millis() as u64,
                };
                result
            }
        }
    }
}
