// crates/wireengine/tests/cleanup_test.rs

mod common;

use common::{init_tracing, pipeline, recorder, tombstones};
use proptest::prelude::*;
use wirecore::{FieldKey, GraphError, NodeId, VIRTUAL_CONTEXT_NODE};
use wireengine::Editor;

const NODE_TYPES: [&str; 5] = ["start", "retrieval", "llm.call", "tool.invoke", "end"];

fn assert_no_trace_of(editor: &Editor, removed: NodeId) {
    assert!(editor.node(removed).is_none());
    assert!(editor.registry().fields_of(removed).is_empty());
    for observer in editor.registry().observers() {
        assert_ne!(observer.consumer(), removed);
        assert_ne!(observer.target().node_id, removed);
    }
    for node in editor.store().nodes() {
        assert!(node.references().iter().all(|r| r.target.node_id != removed));
    }
    assert!(editor.store().edges().all(|e| !e.touches(removed)));
}

#[test]
fn removing_a_target_tombstones_and_unbinds_its_consumers() {
    init_tracing();
    let mut p = pipeline();
    let (log, callback) = recorder();
    p.editor
        .declare_reference(p.c, "context", FieldKey::new(p.b, "output"), Some(callback))
        .unwrap();

    p.editor.remove_node(p.b).unwrap();

    assert_eq!(tombstones(&log), 1);
    assert!(p.editor.node(p.c).unwrap().references().is_empty());
    assert_eq!(p.editor.registry().observer_count(), 0);
    assert_no_trace_of(&p.editor, p.b);
    assert!(p.editor.validate(p.c).is_ok());
    assert!(p.editor.validation_report().is_ok());
}

#[test]
fn removing_a_consumer_stops_its_observers() {
    let mut p = pipeline();
    let (log, callback) = recorder();
    p.editor
        .declare_reference(p.d, "answer", FieldKey::new(p.c, "output"), Some(callback))
        .unwrap();
    p.editor
        .declare_reference(p.d, "app", FieldKey::new(VIRTUAL_CONTEXT_NODE, "appId"), None)
        .unwrap();
    assert_eq!(p.editor.registry().observer_count(), 2);

    p.editor.remove_node(p.d).unwrap();

    assert_eq!(tombstones(&log), 1);
    assert_eq!(p.editor.registry().observer_count(), 0);
    assert_no_trace_of(&p.editor, p.d);
    // context fields are session-owned and survive
    assert!(p
        .editor
        .registry()
        .current(&FieldKey::new(VIRTUAL_CONTEXT_NODE, "appId"))
        .is_some());
}

#[test]
fn removing_a_missing_node_fails() {
    let mut p = pipeline();
    let ghost = uuid::Uuid::new_v4();
    assert!(matches!(
        p.editor.remove_node(ghost),
        Err(GraphError::NodeNotFound(id)) if id == ghost
    ));
}

#[derive(Debug, Clone)]
enum Op {
    Add(usize),
    Connect(usize, usize),
    Reference(usize, usize),
    Disconnect(usize),
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NODE_TYPES.len()).prop_map(Op::Add),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Connect(a, b)),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Reference(a, b)),
        any::<usize>().prop_map(Op::Disconnect),
        any::<usize>().prop_map(Op::Remove),
    ]
}

fn pick(ids: &[NodeId], i: usize) -> Option<NodeId> {
    (!ids.is_empty()).then(|| ids[i % ids.len()])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn arbitrary_edits_never_leave_dangling_references(ops in prop::collection::vec(op(), 1..60)) {
        let mut editor = Editor::new();

        for op in ops {
            let ids = editor.store().node_ids();
            let outcome = match op {
                Op::Add(t) => editor.create_node(NODE_TYPES[t], None).map(|_| ()),
                Op::Connect(a, b) => match (pick(&ids, a), pick(&ids, b)) {
                    (Some(from), Some(to)) => editor.connect(from, "out", to, "in", None).map(|_| ()),
                    _ => Ok(()),
                },
                Op::Reference(a, b) => match (pick(&ids, a), pick(&ids, b)) {
                    (Some(consumer), Some(target)) => editor
                        .declare_reference(consumer, &format!("slot{}", b % 3), FieldKey::new(target, "output"), None)
                        .map(|_| ()),
                    _ => Ok(()),
                },
                Op::Disconnect(i) => {
                    let edges: Vec<_> = editor.store().edges().map(|e| e.id).collect();
                    if edges.is_empty() {
                        Ok(())
                    } else {
                        editor.disconnect(edges[i % edges.len()])
                    }
                }
                Op::Remove(i) => match pick(&ids, i) {
                    Some(id) => {
                        let result = editor.remove_node(id);
                        prop_assert!(result.is_ok());
                        assert_no_trace_of(&editor, id);
                        result
                    }
                    None => Ok(()),
                },
            };

            prop_assert!(
                !matches!(outcome, Err(GraphError::UnknownNodeReference { .. })),
                "cleanup cascade missed a reference"
            );
            let report = editor.validation_report();
            prop_assert!(!matches!(report, Err(GraphError::UnknownNodeReference { .. })), "validation report found an unknown node reference");
        }
    }
}
