use crate::{BranchId, EdgeId, EvaluationOverlay, FieldKey, NodeId, ObserverId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted while the graph is being edited
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GraphEvent {
    NodeAdded {
        node_id: NodeId,
        node_type: String,
        timestamp: DateTime<Utc>,
    },
    NodeRemoved {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    EdgeAdded {
        edge_id: EdgeId,
        from_id: NodeId,
        to_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    EdgeRemoved {
        edge_id: EdgeId,
        timestamp: DateTime<Utc>,
    },
    BranchAdded {
        node_id: NodeId,
        branch_id: BranchId,
        timestamp: DateTime<Utc>,
    },
    BranchRemoved {
        node_id: NodeId,
        branch_id: BranchId,
        timestamp: DateTime<Utc>,
    },
    RunnableChanged {
        node_id: NodeId,
        runnable: bool,
        disabled: bool,
        timestamp: DateTime<Utc>,
    },
    BranchRunnableChanged {
        node_id: NodeId,
        branch_id: BranchId,
        runnable: bool,
        timestamp: DateTime<Utc>,
    },
    ReferenceStatusChanged {
        observer: ObserverId,
        consumer: NodeId,
        target: FieldKey,
        enabled: bool,
        timestamp: DateTime<Utc>,
    },
    OverlayEntered {
        overlay: EvaluationOverlay,
        timestamp: DateTime<Utc>,
    },
    OverlayLeft {
        timestamp: DateTime<Utc>,
    },
}

impl GraphEvent {
    pub fn runnable_changed(node_id: NodeId, runnable: bool, disabled: bool) -> Self {
        GraphEvent::RunnableChanged {
            node_id,
            runnable,
            disabled,
            timestamp: Utc::now(),
        }
    }

    pub fn reference_status(observer: ObserverId, consumer: NodeId, target: FieldKey, enabled: bool) -> Self {
        GraphEvent::ReferenceStatusChanged {
            observer,
            consumer,
            target,
            enabled,
            timestamp: Utc::now(),
        }
    }
}

/// Editor-session event bus. Sending never blocks; events are dropped when
/// nobody is listening.
pub struct EventBus {
    sender: broadcast::Sender<GraphEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: GraphEvent) {
        let _ = self.sender.send(event);
    }
}
