use crate::{BranchId, EdgeId, NodeId, ObserverId};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid edge: {0}")]
    InvalidEdge(#[from] InvalidEdge),

    #[error("Branch error: {0}")]
    Branch(#[from] BranchError),

    #[error("Validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("Observer not found: {0}")]
    ObserverNotFound(ObserverId),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Reference slot '{slot}' is not declared on node {node}")]
    UnknownSlot { node: NodeId, slot: String },

    /// An observer outlived its target node. This is a cleanup bug, never a
    /// user error.
    #[error("Node {consumer} holds a reference to unknown node {target}")]
    UnknownNodeReference { consumer: NodeId, target: NodeId },

    #[error("Node {0} is displaying a frozen configuration")]
    FrozenConfig(NodeId),

    #[error("Unsupported document version: {0}")]
    UnsupportedVersion(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Validation errors carried by this error, if any
    pub fn violations(&self) -> &[ValidationError] {
        match self {
            GraphError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

/// Rejected at the graph store boundary; a rejected edge never enters the model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidEdge {
    #[error("self-loop on node {node}")]
    SelfLoop { node: NodeId },

    #[error("edge {from}:{from_port} -> {to}:{to_port} already exists")]
    Duplicate {
        from: NodeId,
        from_port: String,
        to: NodeId,
        to_port: String,
    },

    #[error("endpoint {0} does not exist")]
    UnknownEndpoint(NodeId),

    #[error("edges leaving condition node {node} must name a branch")]
    MissingBranch { node: NodeId },

    #[error("branch {branch} does not belong to node {node}")]
    UnknownBranch { node: NodeId, branch: BranchId },

    #[error("node {node} is not a condition node and cannot carry branch {branch}")]
    UnexpectedBranch { node: NodeId, branch: BranchId },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BranchError {
    #[error("node {0} is not a condition node")]
    NotACondition(NodeId),

    #[error("branch {0} not found")]
    UnknownBranch(BranchId),

    #[error("the else branch {0} cannot be removed")]
    ElseBranchRemoval(BranchId),

    #[error("branch {0} is the last conditional branch")]
    LastBranch(BranchId),

    #[error("branch {branch} belongs to missing node {owner}")]
    OrphanBranch { branch: BranchId, owner: NodeId },

    #[error("condition node {0} has no conditional branch")]
    NoConditionalBranch(NodeId),

    #[error("condition node {node} must own exactly one else branch, found {count}")]
    ElseBranchCount { node: NodeId, count: usize },
}

/// Structural or referential problem found by the validator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ValidationError {
    #[error("node {consumer} references node {missing_target}, which is not connected upstream")]
    DisconnectedReference {
        consumer: NodeId,
        missing_target: NodeId,
    },

    #[error("condition node {node} has {connected} connected branch(es) but {runnable} runnable")]
    BranchConnectivityMismatch {
        node: NodeId,
        connected: usize,
        runnable: usize,
    },

    #[error("node {node} must have exactly one outgoing edge, found {outgoing}")]
    MissingOrAmbiguousOutgoingEdge { node: NodeId, outgoing: usize },

    #[error("end node {node} must not have outgoing edges, found {outgoing}")]
    UnexpectedOutgoingEdge { node: NodeId, outgoing: usize },
}

impl ValidationError {
    /// The node the UI should highlight
    pub fn node(&self) -> NodeId {
        match self {
            ValidationError::DisconnectedReference { consumer, .. } => *consumer,
            ValidationError::BranchConnectivityMismatch { node, .. }
            | ValidationError::MissingOrAmbiguousOutgoingEdge { node, .. }
            | ValidationError::UnexpectedOutgoingEdge { node, .. } => *node,
        }
    }
}
