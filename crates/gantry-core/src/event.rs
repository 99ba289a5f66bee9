//! Named-event publisher shared by robots, connections and devices
//!
//! A publisher keeps an ordered listener list per event name. Publishing is
//! synchronous: listeners run on the publishing thread in subscription order,
//! so a single device's events reach each listener in the order they were
//! published. A publisher can relay everything it publishes to other
//! publishers, which is how a device republishes its driver's events.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::trace;

/// Callback invoked with the payload of each published event
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`EventPublisher::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
    relays: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn publish(&self, event: &str, payload: &Value) {
        // Snapshot so listeners may subscribe/unsubscribe while being called
        let listeners: Vec<Listener> = {
            let map = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            map.get(event)
                .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };

        trace!(event, listeners = listeners.len(), "Publishing event");
        for listener in listeners {
            listener(payload);
        }

        let relays: Vec<Arc<Inner>> = {
            let mut relays = self.relays.lock().unwrap_or_else(PoisonError::into_inner);
            relays.retain(|r| r.strong_count() > 0);
            relays.iter().filter_map(Weak::upgrade).collect()
        };
        for relay in relays {
            relay.publish(event, payload);
        }
    }
}

/// Cloneable handle to a shared set of event listeners
#[derive(Clone, Default)]
pub struct EventPublisher {
    inner: Arc<Inner>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event`
    pub fn subscribe<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut map = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(event.into())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove exactly the listener registered under `id`; returns whether it was present
    pub fn unsubscribe(&self, event: &str, id: ListenerId) -> bool {
        let mut map = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = map.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(event);
        }
        removed
    }

    /// Deliver `payload` to every listener of `event`, then to relay targets
    pub fn publish(&self, event: &str, payload: &Value) {
        self.inner.publish(event, payload);
    }

    /// Forward everything published here to `target` as well.
    ///
    /// Only a weak reference to `target` is kept; relays must not form a cycle.
    pub fn relay_to(&self, target: &EventPublisher) {
        let mut relays = self.inner.relays.lock().unwrap_or_else(PoisonError::into_inner);
        relays.push(Arc::downgrade(&target.inner));
    }

    pub fn listener_count(&self, event: &str) -> usize {
        let map = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(event).map_or(0, Vec::len)
    }

    pub fn total_listeners(&self) -> usize {
        let map = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        map.values().map(Vec::len).sum()
    }
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&str, usize> = map.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        f.debug_struct("EventPublisher").field("listeners", &counts).finish()
    }
}
