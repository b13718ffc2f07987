use indexmap::IndexMap;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::HashMap;
use wirecore::{
    BranchAware, BranchId, Edge, EdgeId, EditorNode, GraphError, InvalidEdge, NodeId,
    VIRTUAL_CONTEXT_NODE,
};

/// Owns the nodes, edges and branches of one editor session.
///
/// Topology lives in a petgraph `StableDiGraph` so indices survive removals;
/// node and edge payloads live in insertion-ordered maps so every traversal
/// is deterministic.
#[derive(Debug, Default)]
pub struct GraphStore {
    graph: StableDiGraph<NodeId, EdgeId>,
    nodes: IndexMap<NodeId, EditorNode>,
    node_indices: HashMap<NodeId, NodeIndex>,
    edges: IndexMap<EdgeId, Edge>,
    edge_indices: HashMap<EdgeId, EdgeIndex>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: EditorNode) -> Result<NodeId, GraphError> {
        let id = node.id;
        if id == VIRTUAL_CONTEXT_NODE || self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        let idx = self.graph.add_node(id);
        self.node_indices.insert(id, idx);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Remove a node and its incident edges. The removed edges are returned
    /// in insertion order.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(EditorNode, Vec<Edge>), GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NodeNotFound(id));
        }

        let incident: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.touches(id))
            .map(|e| e.id)
            .collect();
        let mut removed = Vec::with_capacity(incident.len());
        for edge_id in incident {
            removed.push(self.remove_edge(edge_id)?);
        }

        if let Some(idx) = self.node_indices.remove(&id) {
            self.graph.remove_node(idx);
        }
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(GraphError::NodeNotFound(id))?;
        Ok((node, removed))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&EditorNode> {
        self.nodes.get(&id)
    }

    pub fn require(&self, id: NodeId) -> Result<&EditorNode, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub(crate) fn require_mut(&mut self, id: NodeId) -> Result<&mut EditorNode, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &EditorNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Find the node owning a branch
    pub fn branch_owner(&self, branch: BranchId) -> Option<&EditorNode> {
        self.nodes.values().find(|n| n.branch(branch).is_some())
    }

    /// Insert an edge after checking the store's edge invariants
    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, InvalidEdge> {
        if edge.from_id == edge.to_id {
            return Err(InvalidEdge::SelfLoop { node: edge.from_id });
        }
        let source = self
            .nodes
            .get(&edge.from_id)
            .ok_or(InvalidEdge::UnknownEndpoint(edge.from_id))?;
        if !self.nodes.contains_key(&edge.to_id) {
            return Err(InvalidEdge::UnknownEndpoint(edge.to_id));
        }

        match (source.kind.is_condition(), edge.branch_id) {
            (true, None) => return Err(InvalidEdge::MissingBranch { node: source.id }),
            (true, Some(branch)) if source.branch(branch).is_none() => {
                return Err(InvalidEdge::UnknownBranch {
                    node: source.id,
                    branch,
                })
            }
            (false, Some(branch)) => {
                return Err(InvalidEdge::UnexpectedBranch {
                    node: source.id,
                    branch,
                })
            }
            _ => {}
        }

        if self.outgoing(edge.from_id).iter().any(|e| e.same_endpoints(&edge)) {
            return Err(InvalidEdge::Duplicate {
                from: edge.from_id,
                from_port: edge.from_port.clone(),
                to: edge.to_id,
                to_port: edge.to_port.clone(),
            });
        }

        let from = self.node_indices[&edge.from_id];
        let to = self.node_indices[&edge.to_id];
        let id = edge.id;
        let idx = self.graph.add_edge(from, to, id);
        self.edge_indices.insert(id, idx);
        self.edges.insert(id, edge);
        Ok(id)
    }

    pub fn connect(
        &mut self,
        from: NodeId,
        from_port: impl Into<String>,
        to: NodeId,
        to_port: impl Into<String>,
        branch: Option<BranchId>,
    ) -> Result<EdgeId, InvalidEdge> {
        self.add_edge(Edge::new(from, from_port, to, to_port, branch))
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge, GraphError> {
        let edge = self
            .edges
            .shift_remove(&id)
            .ok_or(GraphError::EdgeNotFound(id))?;
        if let Some(idx) = self.edge_indices.remove(&id) {
            self.graph.remove_edge(idx);
        }
        Ok(edge)
    }

    /// Remove every edge tagged with a branch
    pub fn remove_branch_edges(&mut self, branch: BranchId) -> Vec<Edge> {
        let tagged: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.branch_id == Some(branch))
            .map(|e| e.id)
            .collect();
        tagged
            .into_iter()
            .filter_map(|id| self.remove_edge(id).ok())
            .collect()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// Edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Outgoing edges of a node in insertion order
    pub fn outgoing(&self, id: NodeId) -> Vec<&Edge> {
        self.incident(id, Direction::Outgoing)
    }

    /// Incoming edges of a node in insertion order
    pub fn incoming(&self, id: NodeId) -> Vec<&Edge> {
        self.incident(id, Direction::Incoming)
    }

    /// Immediate predecessors, each listed once
    pub fn predecessors_of(&self, id: NodeId) -> Vec<NodeId> {
        dedup(self.incoming(id).into_iter().map(|e| e.from_id))
    }

    /// Immediate successors, each listed once
    pub fn successors_of(&self, id: NodeId) -> Vec<NodeId> {
        dedup(self.outgoing(id).into_iter().map(|e| e.to_id))
    }

    fn incident(&self, id: NodeId, direction: Direction) -> Vec<&Edge> {
        let Some(&idx) = self.node_indices.get(&id) else {
            return Vec::new();
        };
        let mut edges: Vec<(usize, &Edge)> = self
            .graph
            .edges_directed(idx, direction)
            .filter_map(|e| {
                let (pos, _, edge) = self.edges.get_full(e.weight())?;
                Some((pos, edge))
            })
            .collect();
        edges.sort_by_key(|(pos, _)| *pos);
        edges.into_iter().map(|(_, e)| e).collect()
    }
}

fn dedup(ids: impl Iterator<Item = NodeId>) -> Vec<NodeId> {
    let mut seen = Vec::new();
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}
