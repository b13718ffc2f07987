use std::collections::BTreeMap;
use wirecore::{EditorNode, GraphError, NodeKind};

/// Descriptor of a node type that can be dropped on the canvas
#[derive(Debug, Clone)]
pub struct NodeTypeDescriptor {
    pub node_type: String,
    pub kind: NodeKind,
    pub description: String,
    pub category: String,
    pub outputs: Vec<OutputField>,
}

impl NodeTypeDescriptor {
    pub fn new(node_type: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            node_type: node_type.into(),
            kind,
            description: String::new(),
            category: "general".to_string(),
            outputs: Vec::new(),
        }
    }

    pub fn describe(mut self, category: impl Into<String>, description: impl Into<String>) -> Self {
        self.category = category.into();
        self.description = description.into();
        self
    }

    pub fn output(mut self, field: impl Into<String>, value_type: impl Into<String>) -> Self {
        self.outputs.push(OutputField {
            field: field.into(),
            value_type: value_type.into(),
        });
        self
    }

    /// Build a fresh node of this type
    pub fn instantiate(&self) -> EditorNode {
        EditorNode::new(self.kind, self.node_type.clone())
    }
}

/// A field a node type can emit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputField {
    pub field: String,
    pub value_type: String,
}

/// Registry of available node types
#[derive(Debug, Clone)]
pub struct NodeCatalog {
    types: BTreeMap<String, NodeTypeDescriptor>,
}

impl NodeCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// Catalog with the editor's built-in node types
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(
            NodeTypeDescriptor::new("start", NodeKind::Start)
                .describe("flow", "Entry point receiving the user input")
                .output("input", "String"),
        );
        catalog.register(
            NodeTypeDescriptor::new("llm.call", NodeKind::Ordinary)
                .describe("model", "Calls a language model")
                .output("output", "String")
                .output("reasoning", "String"),
        );
        catalog.register(
            NodeTypeDescriptor::new("retrieval", NodeKind::Ordinary)
                .describe("knowledge", "Retrieves documents from a knowledge base")
                .output("output", "Array"),
        );
        catalog.register(
            NodeTypeDescriptor::new("tool.invoke", NodeKind::Ordinary)
                .describe("tool", "Invokes a registered tool")
                .output("output", "Object"),
        );
        catalog.register(
            NodeTypeDescriptor::new("condition", NodeKind::Condition)
                .describe("flow", "Routes to the first branch whose condition holds"),
        );
        catalog.register(
            NodeTypeDescriptor::new("evaluation.algorithm", NodeKind::Evaluation)
                .describe("evaluation", "Scores the output of the evaluated sub-flow")
                .output("score", "Number"),
        );
        catalog.register(
            NodeTypeDescriptor::new("end", NodeKind::End)
                .describe("flow", "Terminates the flow and returns its output"),
        );
        catalog
    }

    pub fn register(&mut self, descriptor: NodeTypeDescriptor) {
        tracing::debug!("Registering node type: {}", descriptor.node_type);
        self.types.insert(descriptor.node_type.clone(), descriptor);
    }

    pub fn get(&self, node_type: &str) -> Result<&NodeTypeDescriptor, GraphError> {
        self.types
            .get(node_type)
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.to_string()))
    }

    pub fn list_node_types(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &NodeTypeDescriptor> {
        self.types.values()
    }
}

impl Default for NodeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_covers_every_kind() {
        let catalog = NodeCatalog::builtin();
        for (node_type, kind) in [
            ("start", NodeKind::Start),
            ("llm.call", NodeKind::Ordinary),
            ("condition", NodeKind::Condition),
            ("evaluation.algorithm", NodeKind::Evaluation),
            ("end", NodeKind::End),
        ] {
            assert_eq!(catalog.get(node_type).unwrap().kind, kind);
        }
    }

    #[test]
    fn unknown_type_is_an_error() {
        let catalog = NodeCatalog::builtin();
        assert!(matches!(
            catalog.get("http.request"),
            Err(GraphError::UnknownNodeType(t)) if t == "http.request"
        ));
    }
}
