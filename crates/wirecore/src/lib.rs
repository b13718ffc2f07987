//! Core data model for the workflow editor's reference engine
//!
//! This crate holds the graph vocabulary shared by the engine and its
//! tooling: node and edge types, reference slots, typed values, the saved
//! document format, errors and graph events. It contains no engine logic.

mod error;
pub mod events;
mod node;
mod value;
mod workflow;

pub use error::{BranchError, GraphError, InvalidEdge, ValidationError};
pub use events::*;
pub use node::{
    Branch, BranchAware, BranchId, Config, EditorNode, FieldId, FieldKey, NodeId, NodeKind,
    NodeState, ObserverId, Position, ReferenceSlot, VIRTUAL_CONTEXT_NODE,
};
pub use value::{type_name_of, TypedValue, Value};
pub use workflow::{
    Edge, EdgeId, EvaluationOverlay, NodeRecord, ReferenceDescriptor, WorkflowDocument,
    DOCUMENT_VERSION,
};

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;
