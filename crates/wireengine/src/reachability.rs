//! Predecessor sets and runnable-path computations.
//!
//! The graph is edited interactively and may contain cycles at any moment,
//! so every walk here tracks visited nodes.

use crate::store::GraphStore;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use wirecore::{
    BranchId, Edge, EdgeId, EvaluationOverlay, NodeId, NodeKind, VIRTUAL_CONTEXT_NODE,
};

/// Every node upstream of `node`, in depth-first discovery order, followed
/// by the virtual context node.
///
/// Incoming edges are only followed out of nodes that accept incoming
/// traversal, so a detached node yields just the virtual context node.
pub fn predecessor_set(store: &GraphStore, node: NodeId) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut visited = HashSet::from([node]);
    let mut stack = Vec::new();
    if store.node(node).is_some_and(|n| n.accepts_incoming()) {
        stack.push(store.predecessors_of(node).into_iter());
    }
    // One pending iterator per open node keeps the depth-first order.
    while let Some(pending) = stack.last_mut() {
        let Some(pred) = pending.next() else {
            stack.pop();
            continue;
        };
        if !visited.insert(pred) {
            continue;
        }
        order.push(pred);
        if store.node(pred).is_some_and(|n| n.accepts_incoming()) {
            stack.push(store.predecessors_of(pred).into_iter());
        }
    }
    order.push(VIRTUAL_CONTEXT_NODE);
    order
}

/// Nodes on a path from a start node to an end node. When the graph has no
/// end node yet, every node reachable from a start node qualifies.
pub fn runnable_nodes(store: &GraphStore) -> HashSet<NodeId> {
    let starts: Vec<NodeId> = nodes_of_kind(store, NodeKind::Start);
    let forward = sweep_forward(store, &starts);

    let ends: Vec<NodeId> = nodes_of_kind(store, NodeKind::End);
    if ends.is_empty() {
        return forward;
    }
    let backward = sweep_backward(store, &ends);
    forward.intersection(&backward).copied().collect()
}

/// Branches of runnable condition nodes whose edges lead to a runnable node
pub fn runnable_branches(store: &GraphStore, runnable: &HashSet<NodeId>) -> HashSet<BranchId> {
    store
        .edges()
        .filter(|e| runnable.contains(&e.from_id) && runnable.contains(&e.to_id))
        .filter(|e| enterable(store, e))
        .filter_map(|e| e.branch_id)
        .collect()
}

fn nodes_of_kind(store: &GraphStore, kind: NodeKind) -> Vec<NodeId> {
    store.nodes().filter(|n| n.kind == kind).map(|n| n.id).collect()
}

fn enterable(store: &GraphStore, edge: &Edge) -> bool {
    store.node(edge.to_id).is_some_and(|n| n.accepts_incoming())
}

fn sweep_forward(store: &GraphStore, seeds: &[NodeId]) -> HashSet<NodeId> {
    let mut seen: HashSet<NodeId> = seeds.iter().copied().collect();
    let mut stack: Vec<NodeId> = seeds.to_vec();
    while let Some(current) = stack.pop() {
        for edge in store.outgoing(current) {
            if enterable(store, edge) && seen.insert(edge.to_id) {
                stack.push(edge.to_id);
            }
        }
    }
    seen
}

fn sweep_backward(store: &GraphStore, seeds: &[NodeId]) -> HashSet<NodeId> {
    let mut seen: HashSet<NodeId> = seeds.iter().copied().collect();
    let mut stack: Vec<NodeId> = seeds.to_vec();
    while let Some(current) = stack.pop() {
        if !store.node(current).is_some_and(|n| n.accepts_incoming()) {
            continue;
        }
        for pred in store.predecessors_of(current) {
            if seen.insert(pred) {
                stack.push(pred);
            }
        }
    }
    seen
}

/// Nodes, edges and branches lying on some path of the evaluation overlay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReachableSet {
    pub nodes: BTreeSet<NodeId>,
    pub edges: BTreeSet<EdgeId>,
    pub branches: BTreeSet<BranchId>,
}

impl ReachableSet {
    fn single(node: NodeId) -> Self {
        Self {
            nodes: BTreeSet::from([node]),
            ..Self::default()
        }
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn contains_edge(&self, edge: EdgeId) -> bool {
        self.edges.contains(&edge)
    }

    pub fn contains_branch(&self, branch: BranchId) -> bool {
        self.branches.contains(&branch)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Successor selection for the evaluation overlay
pub trait OverlayTraversal {
    /// Pick which of `outgoing` the overlay walk descends into
    fn overlay_successors<'a>(&self, outgoing: Vec<&'a Edge>, store: &GraphStore) -> Vec<&'a Edge>;
}

impl OverlayTraversal for NodeKind {
    fn overlay_successors<'a>(&self, outgoing: Vec<&'a Edge>, store: &GraphStore) -> Vec<&'a Edge> {
        if self.is_condition() {
            return outgoing;
        }
        // Any evaluation successor excludes the ordinary siblings.
        let evaluation: Vec<&Edge> = outgoing
            .iter()
            .copied()
            .filter(|e| store.node(e.to_id).is_some_and(|n| n.kind.is_evaluation()))
            .collect();
        if evaluation.is_empty() {
            outgoing
        } else {
            evaluation
        }
    }
}

/// Compute the overlay's reachable set: everything on some path from
/// `overlay.start` to `overlay.end` under the overlay traversal rule.
///
/// The rule only depends on the node being left, so the overlay is a fixed
/// subgraph. A forward sweep from the start over that subgraph is
/// intersected with a backward sweep from the end. Walks stop at the end
/// node going forward and at the start node going backward, so loops
/// through either endpoint stay out of the set.
pub fn evaluation_reachable(store: &GraphStore, overlay: &EvaluationOverlay) -> ReachableSet {
    let (start, end) = (overlay.start, overlay.end);
    if !store.contains(start) || !store.contains(end) {
        return ReachableSet::default();
    }
    if start == end {
        return ReachableSet::single(start);
    }

    let selected = overlay_edges(store, start, end);
    let mut into: HashMap<NodeId, Vec<&Edge>> = HashMap::new();
    for edge in &selected {
        into.entry(edge.to_id).or_default().push(*edge);
    }

    let mut backward = HashSet::from([end]);
    let mut stack = vec![end];
    while let Some(current) = stack.pop() {
        if current == start {
            continue;
        }
        for edge in into.get(&current).into_iter().flatten() {
            if backward.insert(edge.from_id) {
                stack.push(edge.from_id);
            }
        }
    }
    if !backward.contains(&start) {
        return ReachableSet::default();
    }

    let mut set = ReachableSet::default();
    for edge in selected {
        // every selected edge leaves a forward-reached node
        if edge.to_id == start || !backward.contains(&edge.to_id) {
            continue;
        }
        set.nodes.insert(edge.from_id);
        set.nodes.insert(edge.to_id);
        set.edges.insert(edge.id);
        if let Some(branch) = edge.branch_id {
            set.branches.insert(branch);
        }
    }
    set
}

/// Edges the overlay walk takes out of every node reachable from `start`,
/// never leaving `end`.
fn overlay_edges<'a>(store: &'a GraphStore, start: NodeId, end: NodeId) -> Vec<&'a Edge> {
    let mut selected = Vec::new();
    let mut seen = HashSet::from([start]);
    let mut stack = vec![start];
    while let Some(current) = stack.pop() {
        if current == end {
            continue;
        }
        let Some(node) = store.node(current) else {
            continue;
        };
        let outgoing: Vec<&Edge> = store
            .outgoing(current)
            .into_iter()
            .filter(|e| enterable(store, e))
            .collect();
        for edge in node.kind.overlay_successors(outgoing, store) {
            if seen.insert(edge.to_id) {
                stack.push(edge.to_id);
            }
            selected.push(edge);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirecore::{BranchAware, EditorNode};

    fn add(store: &mut GraphStore, kind: NodeKind) -> NodeId {
        store.add_node(EditorNode::new(kind, kind.to_string())).unwrap()
    }

    #[test]
    fn predecessors_survive_cycles() {
        let mut store = GraphStore::new();
        let a = add(&mut store, NodeKind::Ordinary);
        let b = add(&mut store, NodeKind::Ordinary);
        let c = add(&mut store, NodeKind::Ordinary);
        store.connect(a, "out", b, "in", None).unwrap();
        store.connect(b, "out", c, "in", None).unwrap();
        store.connect(c, "out", a, "in", None).unwrap();

        assert_eq!(predecessor_set(&store, c), vec![b, a, VIRTUAL_CONTEXT_NODE]);
    }

    #[test]
    fn detached_node_only_sees_the_context_node() {
        let mut store = GraphStore::new();
        let a = add(&mut store, NodeKind::Start);
        let b = store
            .add_node(EditorNode::new(NodeKind::Ordinary, "llm.call").with_incoming(false))
            .unwrap();
        store.connect(a, "out", b, "in", None).unwrap();

        assert_eq!(predecessor_set(&store, b), vec![VIRTUAL_CONTEXT_NODE]);
    }

    #[test]
    fn runnable_requires_a_path_to_an_end() {
        let mut store = GraphStore::new();
        let s = add(&mut store, NodeKind::Start);
        let a = add(&mut store, NodeKind::Ordinary);
        let dangling = add(&mut store, NodeKind::Ordinary);
        let e = add(&mut store, NodeKind::End);
        store.connect(s, "out", a, "in", None).unwrap();
        store.connect(a, "out", e, "in", None).unwrap();
        store.connect(s, "out", dangling, "in", None).unwrap();

        let runnable = runnable_nodes(&store);
        assert_eq!(runnable, HashSet::from([s, a, e]));
    }

    #[test]
    fn without_an_end_reachability_from_start_suffices() {
        let mut store = GraphStore::new();
        let s = add(&mut store, NodeKind::Start);
        let a = add(&mut store, NodeKind::Ordinary);
        let island = add(&mut store, NodeKind::Ordinary);
        store.connect(s, "out", a, "in", None).unwrap();

        let runnable = runnable_nodes(&store);
        assert!(runnable.contains(&a));
        assert!(!runnable.contains(&island));
    }

    #[test]
    fn evaluation_successors_exclude_ordinary_siblings() {
        let mut store = GraphStore::new();
        let s = add(&mut store, NodeKind::Start);
        let side = add(&mut store, NodeKind::Ordinary);
        let eval = add(&mut store, NodeKind::Evaluation);
        let e = add(&mut store, NodeKind::End);
        store.connect(s, "out", side, "in", None).unwrap();
        store.connect(s, "out", eval, "in", None).unwrap();
        store.connect(side, "out", e, "in", None).unwrap();
        store.connect(eval, "out", e, "in", None).unwrap();

        let set = evaluation_reachable(&store, &EvaluationOverlay { start: s, end: e });
        assert_eq!(set.nodes, BTreeSet::from([s, eval, e]));
        assert_eq!(set.edges.len(), 2);
    }

    #[test]
    fn condition_branches_are_all_explored() {
        let mut store = GraphStore::new();
        let s = add(&mut store, NodeKind::Start);
        let cond = EditorNode::new(NodeKind::Condition, "condition");
        let (b1, b2) = (cond.branches()[0].id, cond.branches()[1].id);
        let c = store.add_node(cond).unwrap();
        let x = add(&mut store, NodeKind::Ordinary);
        let y = add(&mut store, NodeKind::Evaluation);
        let e = add(&mut store, NodeKind::End);
        store.connect(s, "out", c, "in", None).unwrap();
        store.connect(c, "b1", x, "in", Some(b1)).unwrap();
        store.connect(c, "b2", y, "in", Some(b2)).unwrap();
        store.connect(x, "out", e, "in", None).unwrap();
        store.connect(y, "out", e, "in", None).unwrap();

        let set = evaluation_reachable(&store, &EvaluationOverlay { start: s, end: e });
        assert_eq!(set.nodes, BTreeSet::from([s, c, x, y, e]));
        assert_eq!(set.branches, BTreeSet::from([b1, b2]));
    }

    #[test]
    fn cycles_off_the_path_do_not_leak_into_the_set() {
        let mut store = GraphStore::new();
        let s = add(&mut store, NodeKind::Start);
        let a = add(&mut store, NodeKind::Ordinary);
        let loop_a = add(&mut store, NodeKind::Ordinary);
        let loop_b = add(&mut store, NodeKind::Ordinary);
        let e = add(&mut store, NodeKind::End);
        store.connect(s, "out", a, "in", None).unwrap();
        store.connect(a, "out", e, "in", None).unwrap();
        store.connect(s, "out", loop_a, "in", None).unwrap();
        store.connect(loop_a, "out", loop_b, "in", None).unwrap();
        store.connect(loop_b, "out", loop_a, "in", None).unwrap();

        let set = evaluation_reachable(&store, &EvaluationOverlay { start: s, end: e });
        assert_eq!(set.nodes, BTreeSet::from([s, a, e]));
    }

    fn chain_of_diamonds(store: &mut GraphStore, from: NodeId, count: usize) -> NodeId {
        let mut join = from;
        for _ in 0..count {
            let left = add(store, NodeKind::Ordinary);
            let right = add(store, NodeKind::Ordinary);
            let next = add(store, NodeKind::Ordinary);
            store.connect(join, "out", left, "in", None).unwrap();
            store.connect(join, "out", right, "in", None).unwrap();
            store.connect(left, "out", next, "in", None).unwrap();
            store.connect(right, "out", next, "in", None).unwrap();
            join = next;
        }
        join
    }

    #[test]
    fn loop_back_to_start_across_diamonds_stays_linear() {
        let mut store = GraphStore::new();
        let s = add(&mut store, NodeKind::Start);
        let last = chain_of_diamonds(&mut store, s, 40);
        let e = add(&mut store, NodeKind::End);
        store.connect(last, "out", e, "in", None).unwrap();
        let back = store.connect(last, "retry", s, "in", None).unwrap();

        let started = std::time::Instant::now();
        let set = evaluation_reachable(&store, &EvaluationOverlay { start: s, end: e });
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        assert_eq!(set.nodes.len(), store.node_count());
        assert_eq!(set.edges.len(), 40 * 4 + 1);
        assert!(!set.contains_edge(back));
    }

    #[test]
    fn loops_through_the_end_are_not_followed() {
        let mut store = GraphStore::new();
        let s = add(&mut store, NodeKind::Start);
        let e = add(&mut store, NodeKind::Ordinary);
        let after = add(&mut store, NodeKind::Ordinary);
        store.connect(s, "out", e, "in", None).unwrap();
        store.connect(e, "out", after, "in", None).unwrap();
        store.connect(after, "out", e, "in", None).unwrap();

        let set = evaluation_reachable(&store, &EvaluationOverlay { start: s, end: e });
        assert_eq!(set.nodes, BTreeSet::from([s, e]));
        assert_eq!(set.edges.len(), 1);
    }

    #[test]
    fn unreachable_end_yields_an_empty_set() {
        let mut store = GraphStore::new();
        let s = add(&mut store, NodeKind::Start);
        let a = add(&mut store, NodeKind::Ordinary);
        let e = add(&mut store, NodeKind::End);
        store.connect(s, "out", a, "in", None).unwrap();
        store.connect(e, "out", a, "in", None).unwrap();

        let set = evaluation_reachable(&store, &EvaluationOverlay { start: s, end: e });
        assert!(set.is_empty());
        assert!(set.edges.is_empty());
    }

    #[test]
    fn long_chains_do_not_exhaust_the_stack() {
        const LENGTH: usize = 50_000;
        let mut store = GraphStore::new();
        let s = add(&mut store, NodeKind::Start);
        let mut last = s;
        for _ in 1..LENGTH {
            let next = add(&mut store, NodeKind::Ordinary);
            store.connect(last, "out", next, "in", None).unwrap();
            last = next;
        }

        let preds = predecessor_set(&store, last);
        assert_eq!(preds.len(), LENGTH);
        assert_eq!(preds[preds.len() - 2], s);

        let set = evaluation_reachable(&store, &EvaluationOverlay { start: s, end: last });
        assert_eq!(set.nodes.len(), LENGTH);
    }
}
