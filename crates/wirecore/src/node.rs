use crate::{BranchError, GraphError, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub type NodeId = Uuid;
pub type BranchId = Uuid;
pub type FieldId = String;

/// Node configuration as edited in the node's form
pub type Config = BTreeMap<String, Value>;

/// Synthetic pseudo-node that publishes session-level fields (instance id,
/// app id, conversation memory). It is a predecessor of every node.
pub const VIRTUAL_CONTEXT_NODE: NodeId = Uuid::nil();

/// Behavioural class of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Ordinary,
    Condition,
    End,
    Evaluation,
}

impl NodeKind {
    pub fn is_condition(self) -> bool {
        matches!(self, NodeKind::Condition)
    }

    pub fn is_evaluation(self) -> bool {
        matches!(self, NodeKind::Evaluation)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Start => "start",
            NodeKind::Ordinary => "ordinary",
            NodeKind::Condition => "condition",
            NodeKind::End => "end",
            NodeKind::Evaluation => "evaluation",
        };
        f.write_str(name)
    }
}

/// Index of an observer in the registry's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Identity of an observable: a field emitted by a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    pub node_id: NodeId,
    pub field: FieldId,
}

impl FieldKey {
    pub fn new(node_id: NodeId, field: impl Into<FieldId>) -> Self {
        Self {
            node_id,
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.field)
    }
}

/// Node position in the visual editor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// A conditional outgoing path owned by a condition node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: BranchId,
    #[serde(rename = "ownerNodeId")]
    pub owner: NodeId,
    pub runnable: bool,
    #[serde(default)]
    pub is_else: bool,
}

impl Branch {
    pub fn conditional(owner: NodeId) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            runnable: false,
            is_else: false,
        }
    }

    pub fn otherwise(owner: NodeId) -> Self {
        Self {
            is_else: true,
            ..Self::conditional(owner)
        }
    }
}

/// A named input bound to an upstream field through an observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSlot {
    pub slot: String,
    pub target: FieldKey,
    pub observer: ObserverId,
}

/// Runnability and configuration snapshots of a node
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub runnable: bool,

    /// Set while the node displays its frozen snapshot instead of its live config
    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub config: Config,

    /// Live config saved while the frozen snapshot is displayed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live: Option<Config>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<Config>,
}

impl NodeState {
    /// Flip the runnable flag, swapping config snapshots. Returns false when
    /// the flag already had the requested value.
    pub fn transition(&mut self, runnable: bool) -> bool {
        if self.runnable == runnable {
            return false;
        }
        self.runnable = runnable;

        if runnable {
            if let Some(live) = self.live.take() {
                self.config = live;
            }
            self.disabled = false;
        } else if let Some(frozen) = &self.frozen {
            self.live = Some(std::mem::replace(&mut self.config, frozen.clone()));
            self.disabled = true;
        }
        true
    }
}

/// Behaviour shared by nodes that own branches
pub trait BranchAware {
    fn branches(&self) -> &[Branch];

    fn branch(&self, id: BranchId) -> Option<&Branch> {
        self.branches().iter().find(|b| b.id == id)
    }

    fn runnable_branch_count(&self) -> usize {
        self.branches().iter().filter(|b| b.runnable).count()
    }

    fn else_branch(&self) -> Option<&Branch> {
        self.branches().iter().find(|b| b.is_else)
    }
}

/// A node placed on the editor canvas
#[derive(Debug, Clone)]
pub struct EditorNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub node_type: String,
    pub name: Option<String>,
    pub position: Option<Position>,
    accepts_incoming: bool,
    state: NodeState,
    references: Vec<ReferenceSlot>,
    branches: Vec<Branch>,
}

impl EditorNode {
    /// Create a node. Condition nodes start with one conditional branch and
    /// the else branch.
    pub fn new(kind: NodeKind, node_type: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), kind, node_type)
    }

    pub fn with_id(id: NodeId, kind: NodeKind, node_type: impl Into<String>) -> Self {
        let branches = if kind.is_condition() {
            vec![Branch::conditional(id), Branch::otherwise(id)]
        } else {
            Vec::new()
        };

        Self {
            id,
            kind,
            node_type: node_type.into(),
            name: None,
            position: None,
            accepts_incoming: true,
            state: NodeState::default(),
            references: Vec::new(),
            branches,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.config.insert(key.into(), value.into());
        self
    }

    /// Replace the whole state; used when restoring a saved document
    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    /// Replace the branch set; used when restoring a saved document
    pub fn with_branches(mut self, branches: Vec<Branch>) -> Self {
        self.branches = branches;
        self
    }

    pub fn with_incoming(mut self, accepts: bool) -> Self {
        self.accepts_incoming = accepts;
        self
    }

    pub fn runnable(&self) -> bool {
        self.state.runnable
    }

    pub fn disabled(&self) -> bool {
        self.state.disabled
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn accepts_incoming(&self) -> bool {
        self.accepts_incoming
    }

    pub fn set_accepts_incoming(&mut self, accepts: bool) -> bool {
        std::mem::replace(&mut self.accepts_incoming, accepts) != accepts
    }

    /// Apply a runnability transition computed by the propagator
    pub fn transition(&mut self, runnable: bool) -> bool {
        self.state.transition(runnable)
    }

    /// Edit the live configuration
    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), GraphError> {
        if self.state.disabled {
            return Err(GraphError::FrozenConfig(self.id));
        }
        self.state.config.insert(key.into(), value.into());
        Ok(())
    }

    /// Record the current configuration as the frozen snapshot
    pub fn freeze(&mut self) -> Result<(), GraphError> {
        if self.state.disabled {
            return Err(GraphError::FrozenConfig(self.id));
        }
        self.state.frozen = Some(self.state.config.clone());
        Ok(())
    }

    pub fn references(&self) -> &[ReferenceSlot] {
        &self.references
    }

    pub fn reference(&self, slot: &str) -> Option<&ReferenceSlot> {
        self.references.iter().find(|r| r.slot == slot)
    }

    /// Bind a slot, returning the binding it replaces
    pub fn bind_reference(&mut self, reference: ReferenceSlot) -> Option<ReferenceSlot> {
        let previous = self.unbind_reference(&reference.slot);
        self.references.push(reference);
        previous
    }

    pub fn unbind_reference(&mut self, slot: &str) -> Option<ReferenceSlot> {
        let pos = self.references.iter().position(|r| r.slot == slot)?;
        Some(self.references.remove(pos))
    }

    pub fn drop_observer(&mut self, observer: ObserverId) -> Option<ReferenceSlot> {
        let pos = self.references.iter().position(|r| r.observer == observer)?;
        Some(self.references.remove(pos))
    }

    /// Insert a conditional branch ahead of the else branch
    pub fn add_branch(&mut self) -> Result<BranchId, BranchError> {
        if !self.kind.is_condition() {
            return Err(BranchError::NotACondition(self.id));
        }
        let branch = Branch::conditional(self.id);
        let id = branch.id;
        let at = self
            .branches
            .iter()
            .position(|b| b.is_else)
            .unwrap_or(self.branches.len());
        self.branches.insert(at, branch);
        Ok(id)
    }

    pub fn remove_branch(&mut self, id: BranchId) -> Result<Branch, BranchError> {
        if !self.kind.is_condition() {
            return Err(BranchError::NotACondition(self.id));
        }
        let pos = self
            .branches
            .iter()
            .position(|b| b.id == id)
            .ok_or(BranchError::UnknownBranch(id))?;

        if self.branches[pos].is_else {
            return Err(BranchError::ElseBranchRemoval(id));
        }
        if self.branches.iter().filter(|b| !b.is_else).count() == 1 {
            return Err(BranchError::LastBranch(id));
        }
        Ok(self.branches.remove(pos))
    }

    pub fn set_branch_runnable(&mut self, id: BranchId, runnable: bool) -> bool {
        match self.branches.iter_mut().find(|b| b.id == id) {
            Some(branch) if branch.runnable != runnable => {
                branch.runnable = runnable;
                true
            }
            _ => false,
        }
    }
}

impl BranchAware for EditorNode {
    fn branches(&self) -> &[Branch] {
        &self.branches
    }
}
