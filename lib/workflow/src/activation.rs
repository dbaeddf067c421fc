//! Trigger activation lifecycle.
//!
//! Event-driven triggers register external state (webhook subscriptions)
//! when a workflow is published and must unregister it on unpublish. The
//! manager sequences those hooks exactly once per transition and persists
//! whatever opaque state a node returns, passing it back verbatim on the
//! next call. Interpreting the state is the node implementation's concern,
//! never the manager's.

use crate::definition::WorkflowDefinition;
use crate::error::ActivationError;
use crate::node::{Node, NodeId};
use crate::registry::NodeRegistry;
use crate::runtime::{
    ActivationContext, ActivationState, IntegrationAccessor, TriggerActivationKind, WorkflowNode,
};
use async_trait::async_trait;
use copper_relay_core::WorkflowId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Persistence boundary for activation state.
#[async_trait]
pub trait ActivationStateStore: Send + Sync {
    /// Loads the stored state for a trigger node, if any.
    async fn load(
        &self,
        workflow_id: WorkflowId,
        node_id: &NodeId,
    ) -> Result<Option<ActivationState>, ActivationError>;

    /// Stores the state for a trigger node, replacing any previous state.
    async fn save(
        &self,
        workflow_id: WorkflowId,
        node_id: &NodeId,
        state: ActivationState,
    ) -> Result<(), ActivationError>;

    /// Removes the stored state for a trigger node.
    async fn clear(&self, workflow_id: WorkflowId, node_id: &NodeId)
    -> Result<(), ActivationError>;
}

/// In-memory activation state store.
#[derive(Default)]
pub struct InMemoryActivationStateStore {
    states: Mutex<HashMap<(WorkflowId, NodeId), ActivationState>>,
}

impl InMemoryActivationStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivationStateStore for InMemoryActivationStateStore {
    async fn load(
        &self,
        workflow_id: WorkflowId,
        node_id: &NodeId,
    ) -> Result<Option<ActivationState>, ActivationError> {
        let states = self.states.lock().map_err(|e| ActivationError::StoreFailed {
            reason: e.to_string(),
        })?;
        Ok(states.get(&(workflow_id, node_id.clone())).cloned())
    }

    async fn save(
        &self,
        workflow_id: WorkflowId,
        node_id: &NodeId,
        state: ActivationState,
    ) -> Result<(), ActivationError> {
        let mut states = self.states.lock().map_err(|e| ActivationError::StoreFailed {
            reason: e.to_string(),
        })?;
        states.insert((workflow_id, node_id.clone()), state);
        Ok(())
    }

    async fn clear(
        &self,
        workflow_id: WorkflowId,
        node_id: &NodeId,
    ) -> Result<(), ActivationError> {
        let mut states = self.states.lock().map_err(|e| ActivationError::StoreFailed {
            reason: e.to_string(),
        })?;
        states.remove(&(workflow_id, node_id.clone()));
        Ok(())
    }
}

/// Sequences trigger activation on publish, unpublish, and heartbeat.
pub struct ActivationManager<S> {
    store: S,
    registry: Arc<NodeRegistry>,
    integrations: Arc<dyn IntegrationAccessor>,
    webhook_base_url: String,
}

impl<S: ActivationStateStore> ActivationManager<S> {
    /// Creates a manager over the given store and registry.
    pub fn new(
        store: S,
        registry: Arc<NodeRegistry>,
        integrations: Arc<dyn IntegrationAccessor>,
        webhook_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            integrations,
            webhook_base_url: webhook_base_url.into(),
        }
    }

    /// Runs activation hooks for a workflow being published.
    ///
    /// Returns the number of trigger nodes activated.
    ///
    /// # Errors
    ///
    /// Fails when a hook or the state store fails; publish should not
    /// proceed with a half-registered subscription.
    pub async fn activate_workflow(
        &self,
        workflow: &WorkflowDefinition,
    ) -> Result<u32, ActivationError> {
        let mut activated = 0;

        for (node, implementation) in self.activation_nodes(workflow) {
            let ctx = self.activation_context(workflow.id, node);
            let state = implementation.on_activate(&ctx).await.map_err(|e| {
                ActivationError::HookFailed {
                    node_id: node.id.clone(),
                    reason: e.to_string(),
                }
            })?;

            self.store.save(workflow.id, &node.id, state).await?;
            tracing::info!(workflow_id = %workflow.id, node_id = %node.id, "trigger activated");
            activated += 1;
        }

        Ok(activated)
    }

    /// Runs deactivation hooks for a workflow being unpublished.
    ///
    /// Best-effort: a hook failure (the external subscription may already
    /// be gone) is logged and never blocks unpublishing. Stored state is
    /// cleared either way.
    ///
    /// # Errors
    ///
    /// Fails only when the state store itself fails.
    pub async fn deactivate_workflow(
        &self,
        workflow: &WorkflowDefinition,
    ) -> Result<u32, ActivationError> {
        let mut deactivated = 0;

        for (node, implementation) in self.activation_nodes(workflow) {
            let state = self.store.load(workflow.id, &node.id).await?;
            let ctx = self.activation_context(workflow.id, node);

            if let Err(e) = implementation.on_deactivate(&ctx, state.as_ref()).await {
                tracing::warn!(
                    workflow_id = %workflow.id,
                    node_id = %node.id,
                    error = %e,
                    "deactivation hook failed, continuing"
                );
            }

            self.store.clear(workflow.id, &node.id).await?;
            deactivated += 1;
        }

        Ok(deactivated)
    }

    /// Runs heartbeat hooks for a published workflow, persisting any
    /// refreshed state.
    ///
    /// Hook failures are logged per node; the remaining triggers still
    /// heartbeat.
    ///
    /// # Errors
    ///
    /// Fails only when the state store itself fails.
    pub async fn heartbeat_workflow(
        &self,
        workflow: &WorkflowDefinition,
    ) -> Result<u32, ActivationError> {
        let mut refreshed = 0;

        for (node, implementation) in self.activation_nodes(workflow) {
            let state = self.store.load(workflow.id, &node.id).await?;
            let ctx = self.activation_context(workflow.id, node);

            match implementation.heartbeat(&ctx, state.as_ref()).await {
                Ok(fresh) => {
                    self.store.save(workflow.id, &node.id, fresh).await?;
                    refreshed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %workflow.id,
                        node_id = %node.id,
                        error = %e,
                        "heartbeat failed, keeping previous state"
                    );
                }
            }
        }

        Ok(refreshed)
    }

    /// Trigger nodes of the workflow whose definitions register external
    /// state on publish.
    fn activation_nodes<'a>(
        &self,
        workflow: &'a WorkflowDefinition,
    ) -> Vec<(&'a Node, Arc<dyn WorkflowNode>)> {
        let graph = workflow.graph();

        workflow
            .nodes
            .iter()
            .filter(|n| graph.trigger_nodes().contains(&n.id))
            .filter_map(|n| {
                let implementation = self.registry.get(&n.node_type)?;
                let definition = implementation.definition();
                (definition.activation == Some(TriggerActivationKind::Webhook))
                    .then_some((n, implementation))
            })
            .collect()
    }

    fn activation_context(&self, workflow_id: WorkflowId, node: &Node) -> ActivationContext {
        ActivationContext {
            workflow_id,
            node_id: node.id.clone(),
            config: node.data.config.clone(),
            webhook_url: format!("{}/{}/{}", self.webhook_base_url, workflow_id, node.id),
            integrations: Arc::clone(&self.integrations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::runtime::{
        NodeCategory, NodeDefinition, NodeError, NodeExecutionResult, NoIntegrations,
        PortDefinition, RunContext,
    };
    use serde_json::Value as JsonValue;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Webhook trigger that counts hook invocations and renews on expiry.
    struct WebhookTrigger {
        activations: AtomicU32,
        deactivations: AtomicU32,
        fail_deactivate: bool,
    }

    impl WebhookTrigger {
        fn new() -> Self {
            Self {
                activations: AtomicU32::new(0),
                deactivations: AtomicU32::new(0),
                fail_deactivate: false,
            }
        }

        fn failing_deactivate() -> Self {
            Self {
                fail_deactivate: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl WorkflowNode for WebhookTrigger {
        fn definition(&self) -> NodeDefinition {
            NodeDefinition {
                id: "relay.trigger.webhook".to_string(),
                title: "Webhook".to_string(),
                description: "Starts the workflow on an external event".to_string(),
                icon: "webhook".to_string(),
                category: NodeCategory::Trigger,
                ports: vec![PortDefinition::output("output", 0)],
                form: JsonValue::Null,
                keywords: Vec::new(),
                activation: Some(TriggerActivationKind::Webhook),
            }
        }

        async fn run(&self, _ctx: &RunContext) -> NodeExecutionResult {
            NodeExecutionResult::success(serde_json::Map::new())
        }

        async fn on_activate(
            &self,
            ctx: &ActivationContext,
        ) -> Result<ActivationState, NodeError> {
            let n = self.activations.fetch_add(1, Ordering::SeqCst) + 1;
            let mut state = ActivationState::new();
            state.insert("webhookId".to_string(), serde_json::json!(format!("hook-{n}")));
            state.insert("webhookUrl".to_string(), serde_json::json!(ctx.webhook_url));
            state.insert("webhookExpiry".to_string(), serde_json::json!("2026-09-01T00:00:00Z"));
            Ok(state)
        }

        async fn on_deactivate(
            &self,
            _ctx: &ActivationContext,
            state: Option<&ActivationState>,
        ) -> Result<(), NodeError> {
            // Nothing registered means nothing to tear down.
            let Some(state) = state else { return Ok(()) };
            if !state.contains_key("webhookId") {
                return Ok(());
            }
            if self.fail_deactivate {
                return Err(NodeError::new("subscription already gone"));
            }
            self.deactivations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn heartbeat(
            &self,
            ctx: &ActivationContext,
            state: Option<&ActivationState>,
        ) -> Result<ActivationState, NodeError> {
            match state {
                Some(existing) if existing.contains_key("webhookExpiry") => {
                    self.on_deactivate(ctx, state).await?;
                    self.on_activate(ctx).await
                }
                Some(existing) => Ok(existing.clone()),
                None => self.on_activate(ctx).await,
            }
        }
    }

    fn webhook_workflow() -> WorkflowDefinition {
        let mut workflow = WorkflowDefinition::new("Published");
        workflow.add_node(Node::new("hook", "relay.trigger.webhook", "Webhook"));
        workflow.add_node(Node::new("step", "core.noop", "Step"));
        workflow.add_edge(crate::edge::Edge::new("e1", "hook", "step"));
        workflow
    }

    fn manager(
        trigger: Arc<WebhookTrigger>,
    ) -> ActivationManager<InMemoryActivationStateStore> {
        let mut registry = NodeRegistry::new();
        registry.register(trigger);
        ActivationManager::new(
            InMemoryActivationStateStore::new(),
            Arc::new(registry),
            Arc::new(NoIntegrations),
            "https://relay.example.com/hooks",
        )
    }

    #[tokio::test]
    async fn activate_persists_returned_state_verbatim() {
        let trigger = Arc::new(WebhookTrigger::new());
        let manager = manager(Arc::clone(&trigger));
        let workflow = webhook_workflow();

        let activated = manager.activate_workflow(&workflow).await.expect("activate");
        assert_eq!(activated, 1);

        let state = manager
            .store
            .load(workflow.id, &NodeId::from("hook"))
            .await
            .expect("load")
            .expect("state stored");
        assert_eq!(state["webhookId"], "hook-1");
        assert!(
            state["webhookUrl"]
                .as_str()
                .expect("url")
                .starts_with("https://relay.example.com/hooks/")
        );
    }

    #[tokio::test]
    async fn deactivate_passes_state_back_and_clears_it() {
        let trigger = Arc::new(WebhookTrigger::new());
        let manager = manager(Arc::clone(&trigger));
        let workflow = webhook_workflow();

        manager.activate_workflow(&workflow).await.expect("activate");
        manager
            .deactivate_workflow(&workflow)
            .await
            .expect("deactivate");

        assert_eq!(trigger.deactivations.load(Ordering::SeqCst), 1);
        let state = manager
            .store
            .load(workflow.id, &NodeId::from("hook"))
            .await
            .expect("load");
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn deactivation_failure_does_not_block_unpublish() {
        let trigger = Arc::new(WebhookTrigger::failing_deactivate());
        let manager = manager(Arc::clone(&trigger));
        let workflow = webhook_workflow();

        manager.activate_workflow(&workflow).await.expect("activate");
        let deactivated = manager
            .deactivate_workflow(&workflow)
            .await
            .expect("deactivate proceeds");

        assert_eq!(deactivated, 1);
        let state = manager
            .store
            .load(workflow.id, &NodeId::from("hook"))
            .await
            .expect("load");
        assert!(state.is_none(), "state cleared despite hook failure");
    }

    #[tokio::test]
    async fn deactivate_without_state_is_a_noop() {
        let trigger = Arc::new(WebhookTrigger::new());
        let manager = manager(Arc::clone(&trigger));
        let workflow = webhook_workflow();

        // Never activated; nothing stored.
        manager
            .deactivate_workflow(&workflow)
            .await
            .expect("deactivate");
        assert_eq!(trigger.deactivations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn heartbeat_renews_expiring_subscription() {
        let trigger = Arc::new(WebhookTrigger::new());
        let manager = manager(Arc::clone(&trigger));
        let workflow = webhook_workflow();

        manager.activate_workflow(&workflow).await.expect("activate");
        manager
            .heartbeat_workflow(&workflow)
            .await
            .expect("heartbeat");

        // The renewal deactivated the old subscription and registered a
        // fresh one, which was persisted.
        assert_eq!(trigger.activations.load(Ordering::SeqCst), 2);
        let state = manager
            .store
            .load(workflow.id, &NodeId::from("hook"))
            .await
            .expect("load")
            .expect("state stored");
        assert_eq!(state["webhookId"], "hook-2");
    }

    #[tokio::test]
    async fn non_webhook_triggers_are_ignored() {
        let trigger = Arc::new(WebhookTrigger::new());
        let manager = manager(Arc::clone(&trigger));

        let mut workflow = WorkflowDefinition::new("Cron only");
        workflow.add_node(Node::new("cron", "relay.trigger.cron", "Every day"));

        let activated = manager.activate_workflow(&workflow).await.expect("activate");
        assert_eq!(activated, 0);
        assert_eq!(trigger.activations.load(Ordering::SeqCst), 0);
    }
}
