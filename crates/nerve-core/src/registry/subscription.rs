// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::{NerveError, NerveResult};
use crate::event::{Event, EventId, EVENT_ALL};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A listener callback.
///
/// Listeners run on dispatch worker threads, possibly several at once for
/// events routed to different shards, so they must be `Send + Sync`.
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Wraps a closure into an [`EventCallback`].
pub fn listener<F>(callback: F) -> EventCallback
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Identifies one binding so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    event_id: EventId,
    key: u64,
}

impl SubscriptionHandle {
    /// The event id the binding listens on.
    pub fn event_id(&self) -> EventId {
        self.event_id
    }
}

/// One listener bound to one event id.
pub struct Subscription {
    id: String,
    event_id: EventId,
    callback: EventCallback,
    key: u64,
}

impl Subscription {
    /// The label the subscriber gave when binding.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The event id this subscription listens on.
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// The handle that removes this subscription.
    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            event_id: self.event_id,
            key: self.key,
        }
    }

    /// Runs the callback.
    pub fn invoke(&self, event: &Event) {
        (self.callback)(event)
    }

    fn same_callback(&self, callback: &EventCallback) -> bool {
        // Compare data pointers only; vtable pointers may differ across
        // codegen units for the same closure.
        std::ptr::eq(
            Arc::as_ptr(&self.callback) as *const (),
            Arc::as_ptr(callback) as *const (),
        )
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_id", &self.event_id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Per-id listener lists.
///
/// New bindings go to the head of their list, so the most recent listener
/// of an id runs first. Delivery takes a [`snapshot`](Self::snapshot) under
/// the read lock and invokes the listeners after the lock is released; a
/// handler may therefore bind or unbind without deadlocking, and the change
/// applies from the next event on.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    listeners: RwLock<HashMap<EventId, Vec<Arc<Subscription>>>>,
    next_key: AtomicU64,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `callback` to `event_id` under the label `id`.
    pub fn bind(&self, id: &str, event_id: EventId, callback: EventCallback) {
        self.bind_removable(id, event_id, callback);
    }

    /// Binds `callback` and returns a handle for [`unbind`](Self::unbind).
    pub fn bind_removable(
        &self,
        id: &str,
        event_id: EventId,
        callback: EventCallback,
    ) -> SubscriptionHandle {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let subscription = Arc::new(Subscription {
            id: id.to_string(),
            event_id,
            callback,
            key,
        });
        let handle = subscription.handle();

        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.entry(event_id).or_default().insert(0, subscription);
        log::debug!("Bound '{id}' to event {event_id}.");
        handle
    }

    /// Removes the binding behind `handle`.
    ///
    /// Fails with [`NerveError::Declined`] if it was already removed.
    pub fn unbind(&self, handle: SubscriptionHandle) -> NerveResult<()> {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let list = listeners
            .get_mut(&handle.event_id)
            .ok_or_else(|| not_bound(handle))?;
        let pos = list
            .iter()
            .position(|s| s.key == handle.key)
            .ok_or_else(|| not_bound(handle))?;
        let removed = list.remove(pos);
        if list.is_empty() {
            listeners.remove(&handle.event_id);
        }
        log::debug!("Unbound '{}' from event {}.", removed.id, handle.event_id);
        Ok(())
    }

    /// Removes, from every id, the first binding that uses `callback`.
    ///
    /// Returns how many bindings were removed.
    pub fn unbind_by_callback(&self, callback: &EventCallback) -> usize {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        listeners.retain(|_, list| {
            if let Some(pos) = list.iter().position(|s| s.same_callback(callback)) {
                list.remove(pos);
                removed += 1;
            }
            !list.is_empty()
        });
        log::debug!("Unbound {removed} subscription(s) by callback.");
        removed
    }

    /// The listeners an event of `event_id` is delivered to: the id's own
    /// list, then the wildcard list.
    pub fn snapshot(&self, event_id: EventId) -> Vec<Arc<Subscription>> {
        let mut out = Vec::new();
        self.snapshot_into(event_id, &mut out);
        out
    }

    /// Like [`snapshot`](Self::snapshot), but fills `out` in place.
    ///
    /// `out` is cleared first and keeps its capacity, so a dispatch worker
    /// reusing one buffer stops allocating once it has seen its widest fan-out.
    pub fn snapshot_into(&self, event_id: EventId, out: &mut Vec<Arc<Subscription>>) {
        out.clear();
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let own = listeners.get(&event_id).into_iter().flatten();
        let wildcard = listeners
            .get(&EVENT_ALL)
            .filter(|_| event_id != EVENT_ALL)
            .into_iter()
            .flatten();
        out.extend(own.chain(wildcard).cloned());
    }

    /// Number of listeners bound directly to `event_id`.
    pub fn listener_count(&self, event_id: EventId) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_id)
            .map_or(0, Vec::len)
    }
}

fn not_bound(handle: SubscriptionHandle) -> NerveError {
    NerveError::Declined(format!(
        "subscription {} on event {} is not bound",
        handle.key, handle.event_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> EventCallback {
        let log = Arc::clone(log);
        listener(move |_| log.lock().unwrap().push(tag.to_string()))
    }

    fn deliver(registry: &SubscriptionRegistry, event: &Event) {
        for subscription in registry.snapshot(event.event_id()) {
            subscription.invoke(event);
        }
    }

    #[test]
    fn specific_listeners_then_wildcard() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.bind("all", EVENT_ALL, recorder(&log, "all"));
        registry.bind("first", 7, recorder(&log, "first"));
        registry.bind("second", 7, recorder(&log, "second"));

        deliver(&registry, &Event::new(7, 0));
        assert_eq!(*log.lock().unwrap(), ["second", "first", "all"]);

        log.lock().unwrap().clear();
        deliver(&registry, &Event::new(EVENT_ALL, 0));
        assert_eq!(*log.lock().unwrap(), ["all"]);
    }

    #[test]
    fn snapshot_into_reuses_the_buffer() {
        let registry = SubscriptionRegistry::new();
        registry.bind("all", EVENT_ALL, listener(|_| {}));
        registry.bind("a", 5, listener(|_| {}));
        registry.bind("b", 5, listener(|_| {}));

        let mut buffer = Vec::new();
        registry.snapshot_into(5, &mut buffer);
        assert_eq!(buffer.len(), 3);
        let capacity = buffer.capacity();

        registry.snapshot_into(6, &mut buffer);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer[0].id(), "all");
        assert_eq!(buffer.capacity(), capacity);
    }

    #[test]
    fn unbind_by_handle() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = registry.bind_removable("x", 3, recorder(&log, "x"));
        assert_eq!(handle.event_id(), 3);

        registry.unbind(handle).unwrap();
        assert_eq!(registry.listener_count(3), 0);
        assert!(registry.unbind(handle).is_err());

        deliver(&registry, &Event::new(3, 0));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn unbind_by_callback_removes_first_match_per_id() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = recorder(&log, "shared");
        let other = recorder(&log, "other");

        registry.bind("a", 1, Arc::clone(&shared));
        registry.bind("b", 1, Arc::clone(&shared));
        registry.bind("c", 2, Arc::clone(&shared));
        registry.bind("d", 2, Arc::clone(&other));

        assert_eq!(registry.unbind_by_callback(&shared), 2);
        assert_eq!(registry.listener_count(1), 1);
        assert_eq!(registry.listener_count(2), 1);
        assert_eq!(registry.unbind_by_callback(&shared), 1);
        assert_eq!(registry.unbind_by_callback(&shared), 0);
    }

    #[test]
    fn handler_may_rebind_during_delivery() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let inner = Arc::clone(&registry);
        registry.bind(
            "rebinder",
            4,
            listener(move |_| inner.bind("late", 4, listener(|_| {}))),
        );

        deliver(&registry, &Event::new(4, 0));
        assert_eq!(registry.listener_count(4), 2);
    }
}
