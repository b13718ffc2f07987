use crate::reachability::predecessor_set;
use crate::store::GraphStore;
use wirecore::{BranchAware, EditorNode, GraphError, NodeId, NodeKind, ValidationError, VIRTUAL_CONTEXT_NODE};

/// Per-kind structural rules checked before a save or run
pub trait Validatable {
    fn check_topology(&self, node: &EditorNode, store: &GraphStore, errors: &mut Vec<ValidationError>);
}

impl Validatable for NodeKind {
    fn check_topology(&self, node: &EditorNode, store: &GraphStore, errors: &mut Vec<ValidationError>) {
        let outgoing = store.outgoing(node.id);
        match self {
            NodeKind::End => {
                if !outgoing.is_empty() {
                    errors.push(ValidationError::UnexpectedOutgoingEdge {
                        node: node.id,
                        outgoing: outgoing.len(),
                    });
                }
            }
            NodeKind::Condition => {
                let connected = node
                    .branches()
                    .iter()
                    .filter(|b| outgoing.iter().any(|e| e.branch_id == Some(b.id)))
                    .count();
                let runnable = node.runnable_branch_count();
                if connected != runnable {
                    errors.push(ValidationError::BranchConnectivityMismatch {
                        node: node.id,
                        connected,
                        runnable,
                    });
                }
            }
            NodeKind::Start | NodeKind::Ordinary | NodeKind::Evaluation => {
                if node.runnable() && outgoing.len() != 1 {
                    errors.push(ValidationError::MissingOrAmbiguousOutgoingEdge {
                        node: node.id,
                        outgoing: outgoing.len(),
                    });
                }
            }
        }
    }
}

/// Collect every violation of one node. Never mutates the store.
///
/// A reference to a node that no longer exists is not a validation failure
/// but a cleanup bug, reported as `UnknownNodeReference`.
pub fn validate_node(store: &GraphStore, id: NodeId) -> Result<Vec<ValidationError>, GraphError> {
    let node = store.require(id)?;
    let mut errors = Vec::new();
    check_references(store, node, &mut errors)?;
    node.kind.check_topology(node, store, &mut errors);
    Ok(errors)
}

/// Collect the violations of every node, in graph order
pub fn validate_graph(store: &GraphStore) -> Result<Vec<ValidationError>, GraphError> {
    let mut errors = Vec::new();
    for id in store.node_ids() {
        errors.extend(validate_node(store, id)?);
    }
    Ok(errors)
}

fn check_references(store: &GraphStore, node: &EditorNode, errors: &mut Vec<ValidationError>) -> Result<(), GraphError> {
    if node.references().is_empty() {
        return Ok(());
    }
    let predecessors = predecessor_set(store, node.id);

    for reference in node.references() {
        let target = reference.target.node_id;
        if target == VIRTUAL_CONTEXT_NODE || predecessors.contains(&target) {
            continue;
        }
        if !store.contains(target) {
            tracing::error!("Node {} references removed node {}", node.id, target);
            return Err(GraphError::UnknownNodeReference {
                consumer: node.id,
                target,
            });
        }
        let error = ValidationError::DisconnectedReference {
            consumer: node.id,
            missing_target: target,
        };
        if !errors.contains(&error) {
            errors.push(error);
        }
    }
    Ok(())
}
