use crate::{Branch, BranchId, GraphError, NodeId, NodeKind, NodeState, Position, TypedValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type EdgeId = Uuid;

/// Current persisted document version
pub const DOCUMENT_VERSION: u32 = 1;

/// Directed connection between two node ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub from_id: NodeId,
    pub from_port: String,
    pub to_id: NodeId,
    pub to_port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<BranchId>,
}

impl Edge {
    pub fn new(
        from_id: NodeId,
        from_port: impl Into<String>,
        to_id: NodeId,
        to_port: impl Into<String>,
        branch_id: Option<BranchId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_id,
            from_port: from_port.into(),
            to_id,
            to_port: to_port.into(),
            branch_id,
        }
    }

    /// True when both edges connect the same (from, fromPort, to, toPort) tuple
    pub fn same_endpoints(&self, other: &Edge) -> bool {
        self.from_id == other.from_id
            && self.from_port == other.from_port
            && self.to_id == other.to_id
            && self.to_port == other.to_port
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.from_id == node || self.to_id == node
    }
}

/// Start/end pair selecting the evaluation sub-flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOverlay {
    pub start: NodeId,
    pub end: NodeId,
}

/// Persisted reference slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDescriptor {
    pub slot: String,
    pub target_node_id: NodeId,
    pub target_field_id: String,
    #[serde(default)]
    pub bound_value_snapshot: Option<TypedValue>,
}

/// Persisted node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: NodeId,
    pub kind: NodeKind,
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default = "default_accepts_incoming")]
    pub accepts_incoming: bool,
    #[serde(flatten)]
    pub state: NodeState,
    #[serde(default)]
    pub references: Vec<ReferenceDescriptor>,
}

fn default_accepts_incoming() -> bool {
    true
}

/// Complete saved graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    pub version: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub saved_at: DateTime<Utc>,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationOverlay>,
}

impl WorkflowDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            name: name.into(),
            description: None,
            saved_at: Utc::now(),
            nodes: Vec::new(),
            edges: Vec::new(),
            branches: Vec::new(),
            evaluation: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let document: WorkflowDocument = serde_json::from_str(json)?;
        if document.version > DOCUMENT_VERSION {
            return Err(GraphError::UnsupportedVersion(document.version));
        }
        Ok(document)
    }

    pub fn to_json_pretty(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Branch records owned by a node, in saved order
    pub fn branches_of(&self, owner: NodeId) -> Vec<Branch> {
        self.branches
            .iter()
            .filter(|b| b.owner == owner)
            .cloned()
            .collect()
    }
}
