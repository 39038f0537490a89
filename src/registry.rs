//! Keyed Registries
//!
//! `Registry` maps producer -> port -> value; `ScalarRegistry` maps producer
//! -> value. Both suppress writes that are structurally equal to what is
//! stored, and both replace their map copy-on-write so a snapshot handed to a
//! reader never observes a later mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::artifact::{PortId, ProducerId, SlotKey};

pub type SubscriptionId = u64;
pub type SlotMap<V> = BTreeMap<ProducerId, BTreeMap<PortId, V>>;

/// Which slots a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    Slot(SlotKey),
    Producer(ProducerId),
    Any,
}

impl Interest {
    pub fn matches(&self, key: &SlotKey) -> bool {
        match self {
            Self::Slot(k) => k == key,
            Self::Producer(p) => *p == key.producer_id,
            Self::Any => true,
        }
    }
}

/// Delivered after a slot changed. `value` is `None` when the slot was removed.
#[derive(Debug)]
pub struct SlotChange<'a, V> {
    pub key: &'a SlotKey,
    pub value: Option<&'a V>,
}

type Callback<V> = Box<dyn FnMut(&SlotChange<'_, V>)>;

struct Subscriber<V> {
    id: SubscriptionId,
    interest: Interest,
    callback: Callback<V>,
}

pub struct Registry<V> {
    name: &'static str,
    slots: Arc<SlotMap<V>>,
    revision: u64,
    subscribers: Vec<Subscriber<V>>,
    next_subscription: SubscriptionId,
}

impl<V: Clone + PartialEq> Registry<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Arc::new(BTreeMap::new()),
            revision: 0,
            subscribers: vec![],
            next_subscription: 1,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, key: &SlotKey) -> Option<&V> {
        self.slots.get(&key.producer_id)?.get(&key.port_id)
    }

    pub fn contains_producer(&self, producer_id: &str) -> bool {
        self.slots.contains_key(producer_id)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.values().map(|ports| ports.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Incremented on every stored-state transition.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> Arc<SlotMap<V>> {
        Arc::clone(&self.slots)
    }

    /// Store `value` unless it equals what the slot already holds.
    /// Returns whether the stored state changed.
    pub fn set(&mut self, key: &SlotKey, value: V) -> bool {
        if self.get(key) == Some(&value) {
            tracing::trace!(registry = self.name, slot = %key, "write suppressed");
            return false;
        }

        Arc::make_mut(&mut self.slots)
            .entry(key.producer_id.clone())
            .or_default()
            .insert(key.port_id.clone(), value);
        self.revision += 1;

        let stored = self
            .slots
            .get(&key.producer_id)
            .and_then(|ports| ports.get(&key.port_id));
        notify(&mut self.subscribers, key, stored);
        true
    }

    /// Compute the next value from the current one. `None` leaves the slot
    /// untouched.
    pub fn update<F>(&mut self, key: &SlotKey, f: F) -> bool
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let next = f(self.get(key));
        match next {
            Some(next) => self.set(key, next),
            None => false,
        }
    }

    /// Drop every port of a producer. Returns how many slots were removed.
    pub fn remove_producer(&mut self, producer_id: &str) -> usize {
        if !self.slots.contains_key(producer_id) {
            return 0;
        }
        let removed = Arc::make_mut(&mut self.slots)
            .remove(producer_id)
            .unwrap_or_default();
        self.revision += 1;

        for port_id in removed.keys() {
            let key = SlotKey::new(producer_id, port_id.as_str());
            notify(&mut self.subscribers, &key, None);
        }
        removed.len()
    }

    pub fn clear(&mut self) -> usize {
        let producers: Vec<ProducerId> = self.slots.keys().cloned().collect();
        producers.iter().map(|p| self.remove_producer(p)).sum()
    }

    pub fn subscribe<F>(&mut self, interest: Interest, callback: F) -> SubscriptionId
    where
        F: FnMut(&SlotChange<'_, V>) + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push(Subscriber {
            id,
            interest,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }
}

fn notify<V>(subscribers: &mut [Subscriber<V>], key: &SlotKey, value: Option<&V>) {
    let change = SlotChange { key, value };
    for sub in subscribers.iter_mut().filter(|s| s.interest.matches(key)) {
        (sub.callback)(&change);
    }
}

/// One value per producer, for node-level metadata.
pub struct ScalarRegistry<V> {
    name: &'static str,
    values: Arc<BTreeMap<ProducerId, V>>,
    revision: u64,
}

impl<V: Clone + PartialEq> ScalarRegistry<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            values: Arc::new(BTreeMap::new()),
            revision: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, producer_id: &str) -> Option<&V> {
        self.values.get(producer_id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> Arc<BTreeMap<ProducerId, V>> {
        Arc::clone(&self.values)
    }

    pub fn set(&mut self, producer_id: &str, value: V) -> bool {
        if self.values.get(producer_id) == Some(&value) {
            tracing::trace!(registry = self.name, producer = producer_id, "write suppressed");
            return false;
        }
        Arc::make_mut(&mut self.values).insert(producer_id.to_string(), value);
        self.revision += 1;
        true
    }

    pub fn remove(&mut self, producer_id: &str) -> bool {
        if !self.values.contains_key(producer_id) {
            return false;
        }
        Arc::make_mut(&mut self.values).remove(producer_id);
        self.revision += 1;
        true
    }

    pub fn clear(&mut self) -> usize {
        let n = self.values.len();
        if n > 0 {
            self.values = Arc::new(BTreeMap::new());
            self.revision += 1;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_set_suppresses_equal_value() {
        let mut reg: Registry<u32> = Registry::new("test");
        let key = SlotKey::new("node-a", "out");

        assert!(reg.set(&key, 1));
        assert!(!reg.set(&key, 1));
        assert_eq!(reg.revision(), 1);
        assert!(reg.set(&key, 2));
        assert_eq!(reg.get(&key), Some(&2));
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let mut reg: Registry<u32> = Registry::new("test");
        let key = SlotKey::new("node-a", "out");
        reg.set(&key, 1);

        let snap = reg.snapshot();
        reg.set(&key, 2);
        reg.remove_producer("node-a");

        assert_eq!(snap["node-a"]["out"], 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_producer_all_ports() {
        let mut reg: Registry<u32> = Registry::new("test");
        reg.set(&SlotKey::new("a", "p1"), 1);
        reg.set(&SlotKey::new("a", "p2"), 2);
        reg.set(&SlotKey::new("b", "p1"), 3);

        assert_eq!(reg.remove_producer("a"), 2);
        assert_eq!(reg.remove_producer("a"), 0);
        assert_eq!(reg.len(), 1);
        assert!(reg.contains_producer("b"));
    }

    #[test]
    fn test_update_none_is_noop() {
        let mut reg: Registry<u32> = Registry::new("test");
        let key = SlotKey::new("a", "p");
        assert!(!reg.update(&key, |_| None));
        assert!(reg.update(&key, |cur| Some(cur.copied().unwrap_or(0) + 1)));
        assert!(reg.update(&key, |cur| Some(cur.copied().unwrap_or(0) + 1)));
        assert_eq!(reg.get(&key), Some(&2));
    }

    #[test]
    fn test_subscribers_see_changes_not_suppressed_writes() {
        let mut reg: Registry<u32> = Registry::new("test");
        let seen: Rc<RefCell<Vec<(String, Option<u32>)>>> = Rc::default();

        let sink = Rc::clone(&seen);
        let id = reg.subscribe(Interest::Slot(SlotKey::new("a", "p")), move |c| {
            sink.borrow_mut().push((c.key.to_string(), c.value.copied()));
        });
        let sink = Rc::clone(&seen);
        reg.subscribe(Interest::Producer("b".into()), move |c| {
            sink.borrow_mut().push((c.key.to_string(), c.value.copied()));
        });

        reg.set(&SlotKey::new("a", "p"), 1);
        reg.set(&SlotKey::new("a", "p"), 1);
        reg.set(&SlotKey::new("a", "other"), 9);
        reg.set(&SlotKey::new("b", "x"), 5);
        reg.remove_producer("a");
        assert!(reg.unsubscribe(id));
        reg.set(&SlotKey::new("a", "p"), 3);

        assert_eq!(
            *seen.borrow(),
            vec![
                ("a/p".to_string(), Some(1)),
                ("b/x".to_string(), Some(5)),
                ("a/p".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_scalar_registry() {
        let mut reg: ScalarRegistry<String> = ScalarRegistry::new("meta");
        assert!(reg.set("k", "v".into()));
        assert!(!reg.set("k", "v".into()));
        assert!(reg.remove("k"));
        assert!(!reg.remove("k"));
        assert_eq!(reg.revision(), 2);
    }
}
