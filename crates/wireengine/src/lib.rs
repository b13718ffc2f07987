//! Reference and runnability engine for the workflow editor
//!
//! Keeps a mutable graph of nodes and cross-node field references consistent
//! under incremental edits: which upstream fields each node may reference,
//! which nodes and branches are runnable, and whether the graph may be saved.

mod catalog;
mod editor;
mod observer;
mod persist;
pub mod propagator;
pub mod reachability;
mod registry;
mod store;
pub mod validator;

pub use catalog::{NodeCatalog, NodeTypeDescriptor, OutputField};
pub use editor::{ContextField, Editor, EngineConfig, StatusCallback};
pub use observer::{Observer, ObserverStatus, ValueCallback};
pub use propagator::RunnabilityPlan;
pub use reachability::{evaluation_reachable, predecessor_set, OverlayTraversal, ReachableSet};
pub use registry::{Observable, ObservableRegistry};
pub use store::GraphStore;
pub use validator::{validate_graph, validate_node, Validatable};
