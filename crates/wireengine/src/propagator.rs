//! Two-phase runnability propagation.
//!
//! Phase one ([`plan`]) reads a fully updated topology and decides the flag
//! of every node and branch without touching anything. Phase two, driven by
//! the editor, applies the flips, swaps config snapshots and re-derives
//! observers. No node ever observes a half-updated neighbour.

use crate::reachability::{evaluation_reachable, runnable_branches, runnable_nodes, ReachableSet};
use crate::store::GraphStore;
use indexmap::IndexMap;
use wirecore::{BranchAware, BranchId, EditorNode, EvaluationOverlay, GraphError, NodeId, VIRTUAL_CONTEXT_NODE};

/// Flags every node and branch should carry after an edit
#[derive(Debug, Clone, Default)]
pub struct RunnabilityPlan {
    nodes: IndexMap<NodeId, bool>,
    branches: Vec<BranchFlag>,
    reachable: Option<ReachableSet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchFlag {
    pub owner: NodeId,
    pub branch: BranchId,
    pub runnable: bool,
}

/// Phase one: compute the target flags from the current topology
pub fn plan(store: &GraphStore, overlay: Option<&EvaluationOverlay>) -> RunnabilityPlan {
    match overlay {
        Some(overlay) => {
            let set = evaluation_reachable(store, overlay);
            let nodes = store.nodes().map(|n| (n.id, set.contains_node(n.id))).collect();
            let branches = branch_flags(store, |b| set.contains_branch(b));
            RunnabilityPlan {
                nodes,
                branches,
                reachable: Some(set),
            }
        }
        None => {
            let runnable = runnable_nodes(store);
            let live_branches = runnable_branches(store, &runnable);
            let nodes = store.nodes().map(|n| (n.id, runnable.contains(&n.id))).collect();
            let branches = branch_flags(store, |b| live_branches.contains(&b));
            RunnabilityPlan {
                nodes,
                branches,
                reachable: None,
            }
        }
    }
}

fn branch_flags(store: &GraphStore, runnable: impl Fn(BranchId) -> bool) -> Vec<BranchFlag> {
    store
        .nodes()
        .flat_map(|node| {
            node.branches().iter().map(|b| BranchFlag {
                owner: node.id,
                branch: b.id,
                runnable: runnable(b.id),
            })
        })
        .collect()
}

impl RunnabilityPlan {
    pub fn is_runnable(&self, node: NodeId) -> bool {
        self.nodes.get(&node).copied().unwrap_or(false)
    }

    /// Nodes whose flag differs from the stored one, in graph order
    pub fn node_transitions(&self, store: &GraphStore) -> Vec<(NodeId, bool)> {
        self.nodes
            .iter()
            .filter(|(id, runnable)| store.node(**id).is_some_and(|n| n.runnable() != **runnable))
            .map(|(id, runnable)| (*id, *runnable))
            .collect()
    }

    /// Branches whose flag differs from the stored one
    pub fn branch_transitions(&self, store: &GraphStore) -> Vec<BranchFlag> {
        self.branches
            .iter()
            .filter(|flag| {
                store
                    .node(flag.owner)
                    .and_then(|n| n.branch(flag.branch))
                    .is_some_and(|b| b.runnable != flag.runnable)
            })
            .copied()
            .collect()
    }

    pub fn into_reachable(self) -> Option<ReachableSet> {
        self.reachable
    }
}

/// Whether an observer of `consumer` targeting `target` must be enabled.
///
/// The target has to be upstream of the consumer and, inside the evaluation
/// overlay, carry the same runnable flag. The virtual context node always
/// qualifies.
pub fn observer_should_enable(
    store: &GraphStore,
    overlay_active: bool,
    consumer: &EditorNode,
    target: NodeId,
    predecessors: &[NodeId],
) -> Result<bool, GraphError> {
    if target == VIRTUAL_CONTEXT_NODE {
        return Ok(true);
    }
    let Some(target_node) = store.node(target) else {
        tracing::error!(
            "Observer on node {} references removed node {}; cleanup cascade was skipped",
            consumer.id,
            target
        );
        return Err(GraphError::UnknownNodeReference {
            consumer: consumer.id,
            target,
        });
    };

    let connected = predecessors.contains(&target);
    let same_class = !overlay_active || consumer.runnable() == target_node.runnable();
    Ok(connected && same_class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirecore::NodeKind;

    #[test]
    fn plan_does_not_mutate_the_store() {
        let mut store = GraphStore::new();
        let s = store.add_node(EditorNode::new(NodeKind::Start, "start")).unwrap();
        let e = store.add_node(EditorNode::new(NodeKind::End, "end")).unwrap();
        store.connect(s, "out", e, "in", None).unwrap();

        let plan = plan(&store, None);
        assert!(plan.is_runnable(s) && plan.is_runnable(e));
        assert!(!store.node(s).unwrap().runnable());
        assert_eq!(plan.node_transitions(&store), vec![(s, true), (e, true)]);
    }

    #[test]
    fn unknown_target_is_a_programmer_error() {
        let mut store = GraphStore::new();
        let consumer = EditorNode::new(NodeKind::Ordinary, "llm.call");
        let id = store.add_node(consumer.clone()).unwrap();
        let ghost = uuid::Uuid::new_v4();

        let result = observer_should_enable(&store, false, store.node(id).unwrap(), ghost, &[]);
        assert!(matches!(
            result,
            Err(GraphError::UnknownNodeReference { target, .. }) if target == ghost
        ));
        assert!(observer_should_enable(&store, false, &consumer, VIRTUAL_CONTEXT_NODE, &[]).unwrap());
    }
}
