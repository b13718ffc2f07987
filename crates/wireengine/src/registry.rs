use crate::observer::{Observer, ObserverStatus, ValueCallback};
use std::collections::{BTreeMap, HashMap};
use wirecore::{FieldKey, GraphError, NodeId, ObserverId, TypedValue};

/// A typed field published by a node
#[derive(Debug, Clone)]
pub struct Observable {
    key: FieldKey,
    current: Option<TypedValue>,
    subscribers: Vec<ObserverId>,
}

impl Observable {
    fn new(key: FieldKey) -> Self {
        Self {
            key,
            current: None,
            subscribers: Vec::new(),
        }
    }

    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    pub fn current(&self) -> Option<&TypedValue> {
        self.current.as_ref()
    }

    /// Subscribers in subscription order
    pub fn subscribers(&self) -> &[ObserverId] {
        &self.subscribers
    }
}

/// Keyed store of observables and the arena of observers subscribed to them.
///
/// Observers are referenced by `ObserverId` from both the observables and the
/// consuming nodes; only the arena owns them.
#[derive(Debug, Default)]
pub struct ObservableRegistry {
    observables: HashMap<FieldKey, Observable>,
    observers: BTreeMap<ObserverId, Observer>,
    next_observer: u64,
}

impl ObservableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field a node can emit, without a value yet
    pub fn register_field(&mut self, key: FieldKey) {
        self.observables
            .entry(key.clone())
            .or_insert_with(|| Observable::new(key));
    }

    /// Upsert the field's value and notify every enabled subscriber once.
    /// Returns the number of deliveries.
    pub fn publish(&mut self, key: FieldKey, value: TypedValue) -> usize {
        let label = key.to_string();
        let observable = self
            .observables
            .entry(key.clone())
            .or_insert_with(|| Observable::new(key));
        observable.current = Some(value.clone());
        let subscribers = observable.subscribers.clone();

        let mut delivered = 0;
        for id in subscribers {
            if let Some(observer) = self.observers.get_mut(&id) {
                if observer.is_enabled() {
                    observer.deliver(Some(&value));
                    delivered += 1;
                }
            }
        }
        tracing::debug!("Published {} to {} observer(s)", label, delivered);
        delivered
    }

    pub fn observable(&self, key: &FieldKey) -> Option<&Observable> {
        self.observables.get(key)
    }

    pub fn current(&self, key: &FieldKey) -> Option<&TypedValue> {
        self.observables.get(key).and_then(|o| o.current.as_ref())
    }

    /// Observables owned by a node
    pub fn fields_of(&self, node: NodeId) -> Vec<&Observable> {
        let mut fields: Vec<&Observable> = self
            .observables
            .values()
            .filter(|o| o.key.node_id == node)
            .collect();
        fields.sort_by(|a, b| a.key.cmp(&b.key));
        fields
    }

    /// Create an observer with a precomputed status and subscribe it.
    ///
    /// A disabled observer receives the tombstone once so the consuming form
    /// clears any stale value.
    pub fn attach(
        &mut self,
        consumer: NodeId,
        slot: impl Into<String>,
        target: FieldKey,
        enabled: bool,
        callback: Option<ValueCallback>,
    ) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;

        let status = if enabled {
            ObserverStatus::Enabled
        } else {
            ObserverStatus::Disabled
        };
        let mut observer = Observer::new(id, consumer, slot.into(), target.clone(), status, callback);
        if !enabled {
            observer.tombstone();
        }
        self.observers.insert(id, observer);
        self.subscribe(&target, id);
        id
    }

    /// Append an observer to a field's subscribers. An enabled observer
    /// immediately receives the current value, if any.
    pub fn subscribe(&mut self, key: &FieldKey, id: ObserverId) {
        let observable = self
            .observables
            .entry(key.clone())
            .or_insert_with(|| Observable::new(key.clone()));
        if !observable.subscribers.contains(&id) {
            observable.subscribers.push(id);
        }
        let current = observable.current.clone();

        if let (Some(observer), Some(value)) = (self.observers.get_mut(&id), current) {
            if observer.is_enabled() {
                observer.deliver(Some(&value));
            }
        }
    }

    pub fn unsubscribe(&mut self, key: &FieldKey, id: ObserverId) -> bool {
        match self.observables.get_mut(key) {
            Some(observable) => {
                let before = observable.subscribers.len();
                observable.subscribers.retain(|s| *s != id);
                observable.subscribers.len() != before
            }
            None => false,
        }
    }

    /// Enable an observer and deliver the current value. Returns true on a
    /// status transition.
    pub fn enable(&mut self, id: ObserverId) -> Result<bool, GraphError> {
        let observer = self
            .observers
            .get(&id)
            .ok_or(GraphError::ObserverNotFound(id))?;
        if observer.is_enabled() {
            return Ok(false);
        }
        let current = self.current(observer.target()).cloned();

        let observer = self
            .observers
            .get_mut(&id)
            .ok_or(GraphError::ObserverNotFound(id))?;
        observer.set_status(ObserverStatus::Enabled);
        if let Some(value) = current {
            observer.deliver(Some(&value));
        }
        Ok(true)
    }

    /// Deliver the tombstone and disable. Returns true on a status transition.
    pub fn disable(&mut self, id: ObserverId) -> Result<bool, GraphError> {
        let observer = self
            .observers
            .get_mut(&id)
            .ok_or(GraphError::ObserverNotFound(id))?;
        if !observer.is_enabled() {
            return Ok(false);
        }
        observer.tombstone();
        observer.set_status(ObserverStatus::Disabled);
        Ok(true)
    }

    /// Deliver the tombstone unconditionally, then detach and drop the observer
    pub fn stop_observe(&mut self, id: ObserverId) -> Result<Observer, GraphError> {
        let mut observer = self
            .observers
            .remove(&id)
            .ok_or(GraphError::ObserverNotFound(id))?;
        observer.tombstone();
        self.unsubscribe(observer.target(), id);
        Ok(observer)
    }

    /// Drop every observable owned by `node` together with their subscribers,
    /// and every observer `node` holds as a consumer. Stopped observers are
    /// returned so their consumers can release the slots.
    pub fn remove_all(&mut self, node: NodeId) -> Vec<Observer> {
        let doomed: Vec<ObserverId> = self
            .observers
            .values()
            .filter(|o| o.consumer() == node || o.target().node_id == node)
            .map(|o| o.id())
            .collect();

        let stopped: Vec<Observer> = doomed
            .into_iter()
            .filter_map(|id| self.stop_observe(id).ok())
            .collect();
        self.observables.retain(|key, _| key.node_id != node);
        stopped
    }

    pub fn observer(&self, id: ObserverId) -> Option<&Observer> {
        self.observers.get(&id)
    }

    pub(crate) fn observer_mut(&mut self, id: ObserverId) -> Result<&mut Observer, GraphError> {
        self.observers
            .get_mut(&id)
            .ok_or(GraphError::ObserverNotFound(id))
    }

    /// Observers in creation order
    pub fn observers(&self) -> impl Iterator<Item = &Observer> {
        self.observers.values()
    }

    pub fn observer_ids(&self) -> Vec<ObserverId> {
        self.observers.keys().copied().collect()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;
    use wirecore::Value;

    type Log = Arc<Mutex<Vec<(Option<Value>, Option<String>)>>>;

    fn recorder() -> (Log, ValueCallback) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let callback: ValueCallback = Box::new(move |value, ty| {
            sink.lock()
                .unwrap()
                .push((value.cloned(), ty.map(str::to_string)));
        });
        (log, callback)
    }

    #[test]
    fn subscribe_delivers_current_value_once() {
        let mut registry = ObservableRegistry::new();
        let key = FieldKey::new(Uuid::new_v4(), "out");
        registry.publish(key.clone(), TypedValue::new("hi", "String"));

        let (log, callback) = recorder();
        let id = registry.attach(Uuid::new_v4(), "query", key, true, Some(callback));

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], (Some(json!("hi")), Some("String".to_string())));
        assert_eq!(registry.observer(id).unwrap().bound().unwrap().value, json!("hi"));
    }

    #[test]
    fn publish_skips_disabled_observers() {
        let mut registry = ObservableRegistry::new();
        let key = FieldKey::new(Uuid::new_v4(), "out");
        let (enabled_log, enabled_cb) = recorder();
        let (disabled_log, disabled_cb) = recorder();
        registry.attach(Uuid::new_v4(), "a", key.clone(), true, Some(enabled_cb));
        registry.attach(Uuid::new_v4(), "b", key.clone(), false, Some(disabled_cb));

        assert_eq!(registry.publish(key, TypedValue::inferred(json!(7))), 1);
        assert_eq!(enabled_log.lock().unwrap().len(), 1);
        // only the construction tombstone
        assert_eq!(*disabled_log.lock().unwrap(), vec![(None, None)]);
    }

    #[test]
    fn enable_and_disable_are_idempotent() {
        let mut registry = ObservableRegistry::new();
        let key = FieldKey::new(Uuid::new_v4(), "out");
        registry.publish(key.clone(), TypedValue::new("v", "String"));
        let (log, callback) = recorder();
        let id = registry.attach(Uuid::new_v4(), "slot", key, true, Some(callback));

        assert!(registry.disable(id).unwrap());
        assert!(!registry.disable(id).unwrap());
        assert!(registry.enable(id).unwrap());
        assert!(!registry.enable(id).unwrap());

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1], (None, None));
        assert_eq!(log[2].0, Some(json!("v")));
    }

    #[test]
    fn stop_observe_tombstones_and_detaches() {
        let mut registry = ObservableRegistry::new();
        let key = FieldKey::new(Uuid::new_v4(), "out");
        let (log, callback) = recorder();
        let id = registry.attach(Uuid::new_v4(), "slot", key.clone(), true, Some(callback));

        registry.stop_observe(id).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![(None, None)]);
        assert!(registry.observable(&key).unwrap().subscribers().is_empty());
        assert!(registry.observer(id).is_none());
        assert!(matches!(registry.stop_observe(id), Err(GraphError::ObserverNotFound(_))));
    }

    #[test]
    fn remove_all_drops_owned_fields_and_held_observers() {
        let mut registry = ObservableRegistry::new();
        let upstream = Uuid::new_v4();
        let middle = Uuid::new_v4();
        let downstream = Uuid::new_v4();
        registry.publish(FieldKey::new(middle, "out"), TypedValue::inferred(json!(1)));
        registry.attach(middle, "in", FieldKey::new(upstream, "out"), true, None);
        registry.attach(downstream, "in", FieldKey::new(middle, "out"), true, None);

        let stopped = registry.remove_all(middle);
        assert_eq!(stopped.len(), 2);
        assert_eq!(registry.observer_count(), 0);
        assert!(registry.fields_of(middle).is_empty());
        assert!(registry.observable(&FieldKey::new(upstream, "out")).is_some());
    }
}
