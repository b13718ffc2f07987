#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use wirecore::{EdgeId, NodeId, Value};
use wireengine::{Editor, ValueCallback};

pub type Log = Arc<Mutex<Vec<(Option<Value>, Option<String>)>>>;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// A value callback that records every delivery
pub fn recorder() -> (Log, ValueCallback) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let callback: ValueCallback = Box::new(move |value, value_type| {
        sink.lock()
            .unwrap()
            .push((value.cloned(), value_type.map(str::to_string)));
    });
    (log, callback)
}

pub fn tombstones(log: &Log) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(value, value_type)| value.is_none() && value_type.is_none())
        .count()
}

pub fn deliveries(log: &Log) -> usize {
    log.lock().unwrap().len()
}

/// Start(A) -> Retrieve(B) -> LLM(C) -> End(D)
pub struct Pipeline {
    pub editor: Editor,
    pub a: NodeId,
    pub b: NodeId,
    pub c: NodeId,
    pub d: NodeId,
    pub ab: EdgeId,
    pub bc: EdgeId,
    pub cd: EdgeId,
}

pub fn pipeline() -> Pipeline {
    let mut editor = Editor::new();
    let a = editor.create_node("start", None).unwrap();
    let b = editor.create_node("retrieval", None).unwrap();
    let c = editor.create_node("llm.call", None).unwrap();
    let d = editor.create_node("end", None).unwrap();
    let ab = editor.connect(a, "out", b, "in", None).unwrap();
    let bc = editor.connect(b, "out", c, "in", None).unwrap();
    let cd = editor.connect(c, "out", d, "in", None).unwrap();
    Pipeline {
        editor,
        a,
        b,
        c,
        d,
        ab,
        bc,
        cd,
    }
}
