use crate::catalog::NodeCatalog;
use crate::observer::{Observer, ValueCallback};
use crate::propagator::{self, observer_should_enable};
use crate::reachability::{predecessor_set, ReachableSet};
use crate::registry::ObservableRegistry;
use crate::store::GraphStore;
use crate::validator::{validate_graph, validate_node};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use wirecore::{
    BranchError, BranchId, EdgeId, EditorNode, EvaluationOverlay, EventBus, FieldKey, GraphError,
    GraphEvent, NodeId, ObserverId, Position, ReferenceSlot, Result, TypedValue, ValidationError,
    Value, VIRTUAL_CONTEXT_NODE,
};

/// Receives `(runnable, disabled)` whenever a node's runnability flips
pub type StatusCallback = Box<dyn FnMut(bool, bool) + Send>;

/// A session-level field published by the virtual context node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextField {
    pub field: String,
    #[serde(default)]
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: String,
}

impl ContextField {
    pub fn new(field: impl Into<String>, value: Value, value_type: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value,
            value_type: value_type.into(),
        }
    }
}

/// Configuration for an editor session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub event_buffer_size: usize,
    pub document_name: String,
    pub context_fields: Vec<ContextField>,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            document_name: "Untitled workflow".to_string(),
            context_fields: vec![
                ContextField::new("instanceId", Value::Null, "String"),
                ContextField::new("appId", Value::Null, "String"),
                ContextField::new("memory", Value::Array(Vec::new()), "Array"),
            ],
        }
    }
}

/// One editing session: the graph, its observables and everything derived
/// from them.
///
/// Every edit runs to completion, including recomputation and propagation,
/// before the method returns.
pub struct Editor {
    pub(crate) config: EngineConfig,
    pub(crate) catalog: NodeCatalog,
    pub(crate) store: GraphStore,
    pub(crate) registry: ObservableRegistry,
    pub(crate) overlay: Option<EvaluationOverlay>,
    pub(crate) reachable: Option<ReachableSet>,
    pub(crate) status_callbacks: HashMap<NodeId, StatusCallback>,
    pub(crate) events: EventBus,
}

impl Editor {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_catalog(NodeCatalog::builtin(), config)
    }

    pub fn with_catalog(catalog: NodeCatalog, config: EngineConfig) -> Self {
        let mut registry = ObservableRegistry::new();
        for field in &config.context_fields {
            registry.publish(
                FieldKey::new(VIRTUAL_CONTEXT_NODE, field.field.clone()),
                TypedValue::new(field.value.clone(), field.value_type.clone()),
            );
        }
        let events = EventBus::new(config.event_buffer_size);

        Self {
            config,
            catalog,
            store: GraphStore::new(),
            registry,
            overlay: None,
            reachable: None,
            status_callbacks: HashMap::new(),
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &NodeCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn registry(&self) -> &ObservableRegistry {
        &self.registry
    }

    pub fn node(&self, id: NodeId) -> Option<&EditorNode> {
        self.store.node(id)
    }

    pub fn observer(&self, id: ObserverId) -> Option<&Observer> {
        self.registry.observer(id)
    }

    pub fn overlay(&self) -> Option<&EvaluationOverlay> {
        self.overlay.as_ref()
    }

    /// Reachable set of the active evaluation overlay
    pub fn reachable_set(&self) -> Option<&ReachableSet> {
        self.reachable.as_ref()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GraphEvent> {
        self.events.subscribe()
    }

    // ---- nodes ----

    /// Drop a node of a catalog type on the canvas
    pub fn create_node(&mut self, node_type: &str, position: Option<Position>) -> Result<NodeId> {
        let mut node = self.catalog.get(node_type)?.instantiate();
        node.position = position;
        self.add_node(node)
    }

    /// Insert a prebuilt node. Output fields of catalog types are registered
    /// as observables.
    pub fn add_node(&mut self, node: EditorNode) -> Result<NodeId> {
        let node_type = node.node_type.clone();
        let id = self.store.add_node(node)?;
        if let Ok(descriptor) = self.catalog.get(&node_type) {
            for output in &descriptor.outputs {
                self.registry
                    .register_field(FieldKey::new(id, output.field.clone()));
            }
        }
        tracing::debug!("Added node {} ({})", id, node_type);
        self.events.emit(GraphEvent::NodeAdded {
            node_id: id,
            node_type,
            timestamp: Utc::now(),
        });
        self.propagate()?;
        Ok(id)
    }

    /// Delete a node, its incident edges, its observables and every
    /// reference to or from it
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let (_, edges) = self.store.remove_node(id)?;
        for edge in edges {
            self.emit_edge_removed(edge.id);
        }

        for observer in self.registry.remove_all(id) {
            if observer.consumer() == id {
                continue;
            }
            if let Ok(consumer) = self.store.require_mut(observer.consumer()) {
                consumer.drop_observer(observer.id());
            }
        }
        self.status_callbacks.remove(&id);

        if self.overlay.is_some_and(|o| o.start == id || o.end == id) {
            tracing::info!("Overlay endpoint {} removed; leaving evaluation", id);
            self.overlay = None;
            self.events.emit(GraphEvent::OverlayLeft { timestamp: Utc::now() });
        }

        tracing::debug!("Removed node {}", id);
        self.events.emit(GraphEvent::NodeRemoved {
            node_id: id,
            timestamp: Utc::now(),
        });
        self.propagate()
    }

    /// Allow or forbid traversal into a node; a node that forbids it is
    /// detached from everything upstream
    pub fn set_incoming_allowed(&mut self, id: NodeId, allowed: bool) -> Result<()> {
        if self.store.require_mut(id)?.set_accepts_incoming(allowed) {
            tracing::debug!("Node {} incoming traversal set to {}", id, allowed);
            self.propagate()?;
        }
        Ok(())
    }

    pub fn set_config(&mut self, id: NodeId, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.store.require_mut(id)?.set_config(key, value)
    }

    /// Record a node's current configuration as its frozen snapshot
    pub fn freeze_config(&mut self, id: NodeId) -> Result<()> {
        self.store.require_mut(id)?.freeze()
    }

    pub fn on_status_change(&mut self, id: NodeId, callback: StatusCallback) -> Result<()> {
        self.store.require(id)?;
        self.status_callbacks.insert(id, callback);
        Ok(())
    }

    // ---- edges and branches ----

    pub fn connect(
        &mut self,
        from: NodeId,
        from_port: impl Into<String>,
        to: NodeId,
        to_port: impl Into<String>,
        branch: Option<BranchId>,
    ) -> Result<EdgeId> {
        let id = self
            .store
            .connect(from, from_port, to, to_port, branch)
            .map_err(|e| {
                tracing::warn!("Rejected edge {} -> {}: {}", from, to, e);
                e
            })?;
        tracing::debug!("Connected {} -> {} ({})", from, to, id);
        self.events.emit(GraphEvent::EdgeAdded {
            edge_id: id,
            from_id: from,
            to_id: to,
            timestamp: Utc::now(),
        });
        self.propagate()?;
        Ok(id)
    }

    pub fn disconnect(&mut self, edge: EdgeId) -> Result<()> {
        self.store.remove_edge(edge)?;
        tracing::debug!("Disconnected edge {}", edge);
        self.emit_edge_removed(edge);
        self.propagate()
    }

    pub fn add_branch(&mut self, node: NodeId) -> Result<BranchId> {
        let branch = self.store.require_mut(node)?.add_branch()?;
        self.events.emit(GraphEvent::BranchAdded {
            node_id: node,
            branch_id: branch,
            timestamp: Utc::now(),
        });
        self.propagate()?;
        Ok(branch)
    }

    /// Remove a conditional branch and the edges leaving through it
    pub fn remove_branch(&mut self, branch: BranchId) -> Result<()> {
        let owner = self
            .store
            .branch_owner(branch)
            .map(|n| n.id)
            .ok_or(BranchError::UnknownBranch(branch))?;
        self.store.require_mut(owner)?.remove_branch(branch)?;

        for edge in self.store.remove_branch_edges(branch) {
            self.emit_edge_removed(edge.id);
        }
        self.events.emit(GraphEvent::BranchRemoved {
            node_id: owner,
            branch_id: branch,
            timestamp: Utc::now(),
        });
        self.propagate()
    }

    // ---- references ----

    /// Bind a reference slot of `consumer` to an upstream field. Rebinding a
    /// slot stops its previous observer first.
    pub fn declare_reference(
        &mut self,
        consumer: NodeId,
        slot: &str,
        target: FieldKey,
        callback: Option<ValueCallback>,
    ) -> Result<ObserverId> {
        self.store.require(consumer)?;
        if target.node_id != VIRTUAL_CONTEXT_NODE {
            self.store.require(target.node_id)?;
        }
        if let Some(previous) = self.store.require_mut(consumer)?.unbind_reference(slot) {
            self.registry.stop_observe(previous.observer)?;
        }
        self.attach_reference(consumer, slot, target, callback)
    }

    pub(crate) fn attach_reference(
        &mut self,
        consumer: NodeId,
        slot: &str,
        target: FieldKey,
        callback: Option<ValueCallback>,
    ) -> Result<ObserverId> {
        let predecessors = predecessor_set(&self.store, consumer);
        let consumer_node = self.store.require(consumer)?;
        let enabled = observer_should_enable(
            &self.store,
            self.overlay.is_some(),
            consumer_node,
            target.node_id,
            &predecessors,
        )?;

        let observer = self
            .registry
            .attach(consumer, slot, target.clone(), enabled, callback);
        let previous = self.store.require_mut(consumer)?.bind_reference(ReferenceSlot {
            slot: slot.to_string(),
            target,
            observer,
        });
        if let Some(previous) = previous {
            self.registry.stop_observe(previous.observer)?;
            tracing::debug!("Node {} slot '{}' rebound, stopped {}", consumer, slot, previous.observer);
        }
        tracing::debug!("Node {} slot '{}' bound via {} (enabled: {})", consumer, slot, observer, enabled);
        Ok(observer)
    }

    pub fn remove_reference(&mut self, consumer: NodeId, slot: &str) -> Result<()> {
        let reference = self
            .store
            .require_mut(consumer)?
            .unbind_reference(slot)
            .ok_or_else(|| GraphError::UnknownSlot {
                node: consumer,
                slot: slot.to_string(),
            })?;
        self.registry.stop_observe(reference.observer)?;
        Ok(())
    }

    /// Attach a value callback to an existing observer, e.g. after a load
    pub fn set_value_callback(&mut self, observer: ObserverId, callback: ValueCallback) -> Result<()> {
        self.registry.observer_mut(observer)?.set_callback(callback);
        Ok(())
    }

    /// Publish a field value; enabled observers receive it before this returns
    pub fn publish(&mut self, node: NodeId, field: &str, value: TypedValue) -> Result<usize> {
        if node != VIRTUAL_CONTEXT_NODE {
            self.store.require(node)?;
        }
        Ok(self.registry.publish(FieldKey::new(node, field), value))
    }

    // ---- queries ----

    /// Every node `id` may legally reference, virtual context node last
    pub fn predecessors_of(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.store.require(id)?;
        Ok(predecessor_set(&self.store, id))
    }

    /// Immediate successors of `id`
    pub fn successors_of(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.store.require(id)?;
        Ok(self.store.successors_of(id))
    }

    // ---- evaluation overlay ----

    pub fn enter_evaluation(&mut self, start: NodeId, end: NodeId) -> Result<&ReachableSet> {
        self.store.require(start)?;
        self.store.require(end)?;
        let overlay = EvaluationOverlay { start, end };
        self.overlay = Some(overlay);
        tracing::info!("Entered evaluation overlay {} -> {}", start, end);
        self.events.emit(GraphEvent::OverlayEntered {
            overlay,
            timestamp: Utc::now(),
        });
        self.propagate()?;
        Ok(&*self.reachable.get_or_insert_with(ReachableSet::default))
    }

    pub fn leave_evaluation(&mut self) -> Result<()> {
        if self.overlay.take().is_none() {
            return Ok(());
        }
        tracing::info!("Left evaluation overlay");
        self.events.emit(GraphEvent::OverlayLeft { timestamp: Utc::now() });
        self.propagate()
    }

    // ---- validation ----

    /// Check one node's references and outgoing topology
    pub fn validate(&self, id: NodeId) -> Result<()> {
        into_result(validate_node(&self.store, id)?)
    }

    /// Check every node, aggregating all violations
    pub fn validate_all(&self) -> Result<()> {
        into_result(validate_graph(&self.store)?)
    }

    /// All violations without failing, for reporting
    pub fn validation_report(&self) -> Result<Vec<ValidationError>> {
        validate_graph(&self.store)
    }

    // ---- propagation ----

    /// Full recomputation of runnability and observer status
    pub fn recompute(&mut self) -> Result<()> {
        self.propagate()
    }

    pub(crate) fn propagate(&mut self) -> Result<()> {
        let plan = propagator::plan(&self.store, self.overlay.as_ref());

        for (id, runnable) in plan.node_transitions(&self.store) {
            let node = self.store.require_mut(id)?;
            node.transition(runnable);
            let disabled = node.disabled();
            tracing::debug!("Node {} runnable -> {} (disabled: {})", id, runnable, disabled);

            if let Some(callback) = self.status_callbacks.get_mut(&id) {
                callback(runnable, disabled);
            }
            self.events.emit(GraphEvent::runnable_changed(id, runnable, disabled));
        }

        for flag in plan.branch_transitions(&self.store) {
            self.store
                .require_mut(flag.owner)?
                .set_branch_runnable(flag.branch, flag.runnable);
            self.events.emit(GraphEvent::BranchRunnableChanged {
                node_id: flag.owner,
                branch_id: flag.branch,
                runnable: flag.runnable,
                timestamp: Utc::now(),
            });
        }

        self.reachable = plan.into_reachable();
        self.resync_observers()
    }

    /// Re-derive every observer's status against the updated graph
    fn resync_observers(&mut self) -> Result<()> {
        let overlay_active = self.overlay.is_some();
        let mut predecessors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for id in self.registry.observer_ids() {
            let Some(observer) = self.registry.observer(id) else {
                continue;
            };
            let consumer_id = observer.consumer();
            let target = observer.target().clone();

            let consumer = self.store.require(consumer_id)?;
            let upstream = predecessors
                .entry(consumer_id)
                .or_insert_with(|| predecessor_set(&self.store, consumer_id));
            let enable = observer_should_enable(&self.store, overlay_active, consumer, target.node_id, upstream)?;

            let changed = if enable {
                self.registry.enable(id)?
            } else {
                self.registry.disable(id)?
            };
            if changed {
                tracing::debug!("{} of node {} -> enabled: {}", id, consumer_id, enable);
                self.events
                    .emit(GraphEvent::reference_status(id, consumer_id, target, enable));
            }
        }
        Ok(())
    }

    fn emit_edge_removed(&self, edge: EdgeId) {
        self.events.emit(GraphEvent::EdgeRemoved {
            edge_id: edge,
            timestamp: Utc::now(),
        });
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

fn into_result(errors: Vec<ValidationError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(GraphError::Validation(errors))
    }
}
