use serde::Serialize;
use std::fmt;
use wirecore::{FieldKey, NodeId, ObserverId, TypedValue, Value};

/// Callback receiving `(value, type)`; `(None, None)` is the tombstone that
/// tells a form to clear a stale reference.
pub type ValueCallback = Box<dyn FnMut(Option<&Value>, Option<&str>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverStatus {
    Enabled,
    Disabled,
}

/// Subscription binding one reference slot of a consumer node to an
/// upstream field.
pub struct Observer {
    id: ObserverId,
    consumer: NodeId,
    slot: String,
    target: FieldKey,
    status: ObserverStatus,
    bound: Option<TypedValue>,
    callback: Option<ValueCallback>,
}

impl Observer {
    pub(crate) fn new(
        id: ObserverId,
        consumer: NodeId,
        slot: String,
        target: FieldKey,
        status: ObserverStatus,
        callback: Option<ValueCallback>,
    ) -> Self {
        Self {
            id,
            consumer,
            slot,
            target,
            status,
            bound: None,
            callback,
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn consumer(&self) -> NodeId {
        self.consumer
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn target(&self) -> &FieldKey {
        &self.target
    }

    pub fn status(&self) -> ObserverStatus {
        self.status
    }

    pub fn is_enabled(&self) -> bool {
        self.status == ObserverStatus::Enabled
    }

    /// Last value delivered to the slot
    pub fn bound(&self) -> Option<&TypedValue> {
        self.bound.as_ref()
    }

    pub(crate) fn set_status(&mut self, status: ObserverStatus) {
        self.status = status;
    }

    pub(crate) fn set_callback(&mut self, callback: ValueCallback) {
        self.callback = Some(callback);
    }

    /// Seed the bound value from a saved document when nothing newer arrived
    pub(crate) fn seed_bound(&mut self, value: TypedValue) {
        if self.is_enabled() && self.bound.is_none() {
            self.bound = Some(value);
        }
    }

    pub(crate) fn deliver(&mut self, value: Option<&TypedValue>) {
        self.bound = value.cloned();
        if let Some(callback) = self.callback.as_mut() {
            callback(
                value.map(|v| &v.value),
                value.map(|v| v.value_type.as_str()),
            );
        }
    }

    pub(crate) fn tombstone(&mut self) {
        self.deliver(None);
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("consumer", &self.consumer)
            .field("slot", &self.slot)
            .field("target", &self.target)
            .field("status", &self.status)
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}
