// crates/wirecore/src/events/mod.rs

mod base;

pub use base::{EventBus, GraphEvent};
