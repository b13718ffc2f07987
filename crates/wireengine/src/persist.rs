// crates/wireengine/src/persist.rs

use crate::catalog::NodeCatalog;
use crate::editor::{EngineConfig, Editor};
use std::path::Path;
use wirecore::{
    BranchAware, BranchError, EditorNode, FieldKey, GraphError, NodeRecord, ReferenceDescriptor,
    Result, WorkflowDocument, DOCUMENT_VERSION, VIRTUAL_CONTEXT_NODE,
};

impl Editor {
    /// Validate the whole graph and produce its saved form. Nothing is
    /// produced while any node has a violation.
    pub fn save(&self) -> Result<WorkflowDocument> {
        self.validate_all()?;
        let document = self.export_draft();
        tracing::info!(
            "Saved '{}': {} nodes, {} edges",
            document.name,
            document.nodes.len(),
            document.edges.len()
        );
        Ok(document)
    }

    /// Saved form of an unfinished graph, without validation
    pub fn export_draft(&self) -> WorkflowDocument {
        let nodes = self
            .store
            .nodes()
            .map(|node| NodeRecord {
                id: node.id,
                kind: node.kind,
                node_type: node.node_type.clone(),
                name: node.name.clone(),
                position: node.position,
                accepts_incoming: node.accepts_incoming(),
                state: node.state().clone(),
                references: node
                    .references()
                    .iter()
                    .map(|r| ReferenceDescriptor {
                        slot: r.slot.clone(),
                        target_node_id: r.target.node_id,
                        target_field_id: r.target.field.clone(),
                        bound_value_snapshot: self
                            .registry
                            .observer(r.observer)
                            .and_then(|o| o.bound().cloned()),
                    })
                    .collect(),
            })
            .collect();

        let branches = self
            .store
            .nodes()
            .flat_map(|n| n.branches().iter().cloned())
            .collect();

        WorkflowDocument {
            nodes,
            edges: self.store.edges().cloned().collect(),
            branches,
            evaluation: self.overlay,
            ..WorkflowDocument::new(self.config.document_name.clone())
        }
    }

    /// Rebuild a session from a saved document: nodes, then edges, then the
    /// overlay and references, then one full recomputation.
    pub fn load(document: &WorkflowDocument, config: EngineConfig) -> Result<Self> {
        Self::load_with_catalog(document, NodeCatalog::builtin(), config)
    }

    pub fn load_with_catalog(document: &WorkflowDocument, catalog: NodeCatalog, config: EngineConfig) -> Result<Self> {
        if document.version > DOCUMENT_VERSION {
            return Err(GraphError::UnsupportedVersion(document.version));
        }
        check_branches(document)?;
        let mut editor = Editor::with_catalog(catalog, config);
        editor.config.document_name = document.name.clone();

        for record in &document.nodes {
            let mut node = EditorNode::with_id(record.id, record.kind, record.node_type.clone())
                .with_state(record.state.clone())
                .with_incoming(record.accepts_incoming);
            node.name = record.name.clone();
            node.position = record.position;

            if record.kind.is_condition() {
                node = node.with_branches(document.branches_of(record.id));
            }

            if let Ok(descriptor) = editor.catalog.get(&record.node_type) {
                for output in &descriptor.outputs {
                    editor
                        .registry
                        .register_field(FieldKey::new(record.id, output.field.clone()));
                }
            }
            editor.store.add_node(node)?;
        }

        for edge in &document.edges {
            editor.store.add_edge(edge.clone())?;
        }

        if let Some(overlay) = document.evaluation {
            if editor.store.contains(overlay.start) && editor.store.contains(overlay.end) {
                editor.overlay = Some(overlay);
            } else {
                tracing::warn!("Ignoring evaluation overlay with missing endpoints");
            }
        }

        for record in &document.nodes {
            for reference in &record.references {
                let target = FieldKey::new(reference.target_node_id, reference.target_field_id.clone());
                if target.node_id != VIRTUAL_CONTEXT_NODE && !editor.store.contains(target.node_id) {
                    return Err(GraphError::NodeNotFound(target.node_id));
                }
                let observer = editor.attach_reference(record.id, &reference.slot, target, None)?;
                if let Some(bound) = &reference.bound_value_snapshot {
                    editor.registry.observer_mut(observer)?.seed_bound(bound.clone());
                }
            }
        }

        editor.propagate()?;
        tracing::info!(
            "Loaded '{}': {} nodes, {} edges",
            document.name,
            editor.store.node_count(),
            editor.store.edge_count()
        );
        Ok(editor)
    }

    /// Read and load a document file
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let document = WorkflowDocument::from_json(&json)?;
        Self::load(&document, config)
    }
}

/// Every branch record must belong to a condition node of the document, and
/// every condition node must own at least one conditional branch plus
/// exactly one else branch.
fn check_branches(document: &WorkflowDocument) -> std::result::Result<(), BranchError> {
    for branch in &document.branches {
        match document.nodes.iter().find(|n| n.id == branch.owner) {
            None => {
                return Err(BranchError::OrphanBranch {
                    branch: branch.id,
                    owner: branch.owner,
                })
            }
            Some(owner) if !owner.kind.is_condition() => {
                return Err(BranchError::NotACondition(owner.id))
            }
            Some(_) => {}
        }
    }

    for record in document.nodes.iter().filter(|n| n.kind.is_condition()) {
        let branches = document.branches_of(record.id);
        let count = branches.iter().filter(|b| b.is_else).count();
        if count == branches.len() {
            return Err(BranchError::NoConditionalBranch(record.id));
        }
        if count != 1 {
            return Err(BranchError::ElseBranchCount {
                node: record.id,
                count,
            });
        }
    }
    Ok(())
}
