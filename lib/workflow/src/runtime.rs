//! The node runtime contract.
//!
//! Every node type implements [`WorkflowNode`]; implementations are selected
//! by the node's type string through the registry, never by the router.
//!
//! `run` cannot fail at the call site: all failure paths are captured into
//! the returned [`NodeExecutionResult`] so the router can treat an error as
//! a normal (failed) result. Logs accumulate inside the result rather than
//! being emitted through side channels, so callers observe completion and
//! output in one place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use copper_relay_core::{IntegrationAccountId, WorkflowId, WorkflowRunId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::node::NodeId;

/// Opaque key/value state returned by a trigger node's activation hook.
///
/// The engine persists and passes this back verbatim; only the node
/// implementation that produced it may interpret its contents.
pub type ActivationState = serde_json::Map<String, JsonValue>;

/// Outcome status of a single node run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// Severity of a log entry produced during a node run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// A log entry captured during a node run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// When the entry was recorded.
    pub ts: DateTime<Utc>,
    /// Structured payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl LogEntry {
    /// Creates an info-level entry.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            message: message.into(),
            ts: Utc::now(),
            data: None,
        }
    }

    /// Creates an error-level entry.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            message: message.into(),
            ts: Utc::now(),
            data: None,
        }
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

/// Metrics captured during a node run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
}

/// A node-level error captured inside an execution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeError {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code, if the node type defines any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl NodeError {
    /// Creates an error with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Sets the machine-readable code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for NodeError {}

/// Result of a single node run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionResult {
    /// Outcome status.
    pub status: RunStatus,
    /// Named outputs. The reserved `port` key selects a conditional branch.
    #[serde(default)]
    pub outputs: serde_json::Map<String, JsonValue>,
    /// Explicit routing: title of the node to run next.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node: Option<String>,
    /// Error details when status is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    /// Logs accumulated during the run.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Metrics for the run.
    #[serde(default)]
    pub metrics: RunMetrics,
}

impl NodeExecutionResult {
    /// Creates a success result with the given outputs.
    #[must_use]
    pub fn success(outputs: serde_json::Map<String, JsonValue>) -> Self {
        Self {
            status: RunStatus::Success,
            outputs,
            next_node: None,
            error: None,
            logs: Vec::new(),
            metrics: RunMetrics::default(),
        }
    }

    /// Creates an error result with the given message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        let error = NodeError::new(message);
        Self {
            status: RunStatus::Error,
            outputs: serde_json::Map::new(),
            next_node: None,
            logs: vec![LogEntry::error(error.message.clone())],
            error: Some(error),
            metrics: RunMetrics::default(),
        }
    }

    /// Sets the `port` output used for conditional routing.
    #[must_use]
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.outputs
            .insert("port".to_string(), JsonValue::String(port.into()));
        self
    }

    /// Requests explicit routing to the node with the given title.
    #[must_use]
    pub fn with_next_node(mut self, title: impl Into<String>) -> Self {
        self.next_node = Some(title.into());
        self
    }

    /// Whether this result carries an error status.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == RunStatus::Error
    }
}

/// Category of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Entry points that initiate workflow execution.
    Trigger,
    /// Effectful steps (integration calls, notifications).
    Action,
    /// Graph structure control (conditions, loops).
    Flow,
}

/// How an event-driven trigger registers itself with the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerActivationKind {
    /// Registers an external webhook subscription on publish.
    Webhook,
    /// Evaluated by the scheduler from a cron expression; no external state.
    Cron,
}

/// Direction of a declared port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A named port declared by a node definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDefinition {
    /// Port identifier, matched against edge `sourcePortId` bindings.
    pub id: String,
    /// Direction.
    pub direction: PortDirection,
    /// Display order.
    pub order: u32,
}

impl PortDefinition {
    /// Declares an output port.
    #[must_use]
    pub fn output(id: impl Into<String>, order: u32) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Output,
            order,
        }
    }

    /// Declares an input port.
    #[must_use]
    pub fn input(id: impl Into<String>, order: u32) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Input,
            order,
        }
    }
}

/// Static metadata describing a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// The type string nodes use to select this implementation.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// Icon name.
    pub icon: String,
    /// Category.
    pub category: NodeCategory,
    /// Declared ports.
    pub ports: Vec<PortDefinition>,
    /// Form schema for the configuration editor, opaque to the engine.
    #[serde(default)]
    pub form: JsonValue,
    /// Search keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Activation behavior, for trigger-category nodes only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<TriggerActivationKind>,
}

/// A single configuration validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// JSON path of the offending field, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Problem description.
    pub message: String,
}

impl ValidationIssue {
    /// Creates an issue for a specific configuration field.
    #[must_use]
    pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }
}

/// Result of validating a node configuration. Never an error: invalid
/// configurations are reported, not thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    /// Whether the configuration is usable.
    pub valid: bool,
    /// Problems found.
    #[serde(default)]
    pub errors: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    /// A passing outcome.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing outcome with the given issues.
    #[must_use]
    pub fn invalid(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// An option offered for a select-style form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionItem {
    /// Display label.
    pub label: String,
    /// Stored value.
    pub value: JsonValue,
}

/// Kind of a generated variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

/// A variable a node exposes to up- or downstream configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDefinition {
    /// Dotted key into the node's outputs or config.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Value kind.
    pub kind: VariableKind,
}

/// Marker trait for typed external-service wrappers.
///
/// Node implementations downcast through `as_any` to the concrete wrapper
/// they were configured with; the engine never knows the concrete type.
pub trait Integration: Send + Sync {
    /// Upcast for downcasting to the concrete integration type.
    fn as_any(&self) -> &dyn Any;
}

/// Resolves integration accounts to their typed wrappers.
#[async_trait]
pub trait IntegrationAccessor: Send + Sync {
    /// Returns the integration registered under the given account id.
    async fn get_integration(&self, id: IntegrationAccountId) -> Option<Arc<dyn Integration>>;
}

/// Accessor used where no integrations are wired (pure nodes, tests).
pub struct NoIntegrations;

#[async_trait]
impl IntegrationAccessor for NoIntegrations {
    async fn get_integration(&self, _id: IntegrationAccountId) -> Option<Arc<dyn Integration>> {
        None
    }
}

/// Everything a node run may observe.
#[derive(Clone)]
pub struct RunContext {
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The run this execution belongs to.
    pub run_id: WorkflowRunId,
    /// The node being executed.
    pub node_id: NodeId,
    /// The node's configuration from the definition.
    pub config: JsonValue,
    /// Outputs of previously executed nodes, keyed by node title.
    pub inputs: serde_json::Map<String, JsonValue>,
    /// Payload from the external event that started the run, if any.
    pub trigger_data: Option<JsonValue>,
    /// Requests a side-effect-free or sample-data execution path.
    pub test_mode: bool,
    /// Access to typed external-service wrappers.
    pub integrations: Arc<dyn IntegrationAccessor>,
}

/// Everything an activation hook may observe.
#[derive(Clone)]
pub struct ActivationContext {
    /// The workflow being published or unpublished.
    pub workflow_id: WorkflowId,
    /// The trigger node the hook belongs to.
    pub node_id: NodeId,
    /// The node's configuration from the definition.
    pub config: JsonValue,
    /// Public callback URL for webhook registration.
    pub webhook_url: String,
    /// Access to typed external-service wrappers.
    pub integrations: Arc<dyn IntegrationAccessor>,
}

/// The uniform lifecycle every node type implements.
///
/// Only `definition` and `run` are mandatory; the remaining hooks default
/// to no-ops because most node types need none of them.
#[async_trait]
pub trait WorkflowNode: Send + Sync {
    /// Static metadata. Pure, no side effects.
    fn definition(&self) -> NodeDefinition;

    /// Validates a node configuration. Reports problems, never fails.
    fn validate(&self, _config: &JsonValue) -> ValidationOutcome {
        ValidationOutcome::ok()
    }

    /// Executes the node. All failures are captured into the result.
    async fn run(&self, ctx: &RunContext) -> NodeExecutionResult;

    /// On-demand option lists for form fields. Empty on any failure.
    async fn fetch_options(&self, _config: &JsonValue, _key: &str) -> Vec<OptionItem> {
        Vec::new()
    }

    /// Registers external state when the workflow is published.
    async fn on_activate(&self, _ctx: &ActivationContext) -> Result<ActivationState, NodeError> {
        Ok(ActivationState::new())
    }

    /// Unregisters external state when the workflow is unpublished.
    ///
    /// Idempotent: implementations short-circuit to a no-op when the state
    /// they need is missing.
    async fn on_deactivate(
        &self,
        _ctx: &ActivationContext,
        _state: Option<&ActivationState>,
    ) -> Result<(), NodeError> {
        Ok(())
    }

    /// Periodically re-validates or renews the activation, returning fresh
    /// state. The default keeps the existing state unchanged.
    async fn heartbeat(
        &self,
        ctx: &ActivationContext,
        state: Option<&ActivationState>,
    ) -> Result<ActivationState, NodeError> {
        match state {
            Some(existing) => Ok(existing.clone()),
            None => self.on_activate(ctx).await,
        }
    }

    /// Variables this node reads from its configuration.
    fn generate_input_variables(&self, _config: &JsonValue) -> Vec<VariableDefinition> {
        Vec::new()
    }

    /// Variables this node exposes to downstream nodes.
    fn generate_output_variables(&self, _config: &JsonValue) -> Vec<VariableDefinition> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_result_has_no_error() {
        let mut outputs = serde_json::Map::new();
        outputs.insert("count".to_string(), serde_json::json!(3));

        let result = NodeExecutionResult::success(outputs);

        assert_eq!(result.status, RunStatus::Success);
        assert!(!result.is_error());
        assert!(result.error.is_none());
    }

    #[test]
    fn error_result_captures_message_and_log() {
        let result = NodeExecutionResult::error("connection refused");

        assert!(result.is_error());
        assert_eq!(result.error.as_ref().map(|e| e.message.as_str()), Some("connection refused"));
        assert_eq!(result.logs.len(), 1);
        assert_eq!(result.logs[0].level, LogLevel::Error);
    }

    #[test]
    fn with_port_sets_reserved_output() {
        let result = NodeExecutionResult::success(serde_json::Map::new()).with_port("true");
        assert_eq!(result.outputs["port"], "true");
    }

    #[test]
    fn node_error_display_includes_code() {
        let err = NodeError::new("rate limited").with_code("429");
        assert_eq!(err.to_string(), "rate limited (429)");
    }

    #[test]
    fn validation_outcome_invalid() {
        let outcome = ValidationOutcome::invalid(vec![ValidationIssue::at(
            "config.url",
            "URL is required",
        )]);
        assert!(!outcome.valid);
        assert_eq!(outcome.errors[0].path.as_deref(), Some("config.url"));
    }

    #[test]
    fn result_serde_roundtrip() {
        let result = NodeExecutionResult::success(serde_json::Map::new())
            .with_port("done")
            .with_next_node("Send summary");

        let json = serde_json::to_string(&result).expect("serialize");
        let parsed: NodeExecutionResult = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(result, parsed);
    }
}
