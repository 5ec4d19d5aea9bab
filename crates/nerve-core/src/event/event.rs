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

use super::header::HeaderList;
use super::{EventId, SourceId, EVENT_ALL};
use crate::error::{NerveError, NerveResult};
use crate::pool::FastNode;

/// A one-shot callback carried by a direct-delivery event.
///
/// It runs exactly once, on the dispatch worker that pops the event, and
/// receives the event itself so it can read headers or the body.
pub type DirectCallback = Box<dyn FnOnce(&mut Event) + Send + 'static>;

/// The unit of communication on the bus.
///
/// An event is either a *subscription* event, broadcast to every listener of
/// its id (and of [`EVENT_ALL`]), or a *direct* event built with
/// [`Event::with_callback`], which bypasses the listeners and runs its own
/// callback instead.
///
/// Attributes live either in an owned [`HeaderList`] or, for events built from
/// a [`FastNode`], in the node's positional slots. Both are visible through
/// [`header`](Event::header) and [`headers`](Event::headers).
pub struct Event {
    event_id: EventId,
    source_id: SourceId,
    headers: HeaderList,
    body: Option<String>,
    callback: Option<DirectCallback>,
    fast: Option<FastNode>,
    timer_key: Option<u32>,
    debug_id: Option<u64>,
}

impl Event {
    /// Creates an empty subscription event.
    pub fn new(event_id: EventId, source_id: SourceId) -> Self {
        Self {
            event_id,
            source_id,
            headers: HeaderList::new(),
            body: None,
            callback: None,
            fast: None,
            timer_key: None,
            debug_id: None,
        }
    }

    /// Creates a direct-delivery event that runs `callback` instead of being
    /// broadcast to listeners.
    pub fn with_callback<F>(source_id: SourceId, callback: F) -> Self
    where
        F: FnOnce(&mut Event) + Send + 'static,
    {
        let mut event = Self::new(EVENT_ALL, source_id);
        event.callback = Some(Box::new(callback));
        event
    }

    /// Creates a subscription event backed by a pool node.
    ///
    /// The node goes back to its pool when the event is dropped.
    pub fn from_fast(event_id: EventId, source_id: SourceId, node: FastNode) -> Self {
        let mut event = Self::new(event_id, source_id);
        event.fast = Some(node);
        event
    }

    /// The event id.
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Changes the event id.
    pub fn set_event_id(&mut self, event_id: EventId) {
        self.event_id = event_id;
    }

    /// The producer tag used for shard routing.
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Changes the producer tag.
    pub fn set_source_id(&mut self, source_id: SourceId) {
        self.source_id = source_id;
    }

    /// Sets a header; an existing header of the same name is overwritten.
    ///
    /// On a fast event a matching slot is rewritten in place. If the new value
    /// does not fit the slot, the slot is cleared and the header moves to the
    /// owned list, so a name never lives in both.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(node) = self.fast.as_mut() {
            if let Some(index) = node.position(&name) {
                if node.set_value(index, &value).is_ok() {
                    return;
                }
                log::trace!("Header '{name}' outgrew fast slot {index}, moving it out.");
                let _ = node.clear_header(index);
            }
        }
        self.headers.set(name, value);
    }

    /// Adds a header only if none of that name exists yet, in the owned list
    /// or in a fast slot.
    pub fn add_header_checked(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> NerveResult<()> {
        let name = name.into();
        if self.fast.as_ref().is_some_and(|node| node.position(&name).is_some()) {
            return Err(NerveError::Declined(format!(
                "header '{name}' is already set"
            )));
        }
        self.headers.insert_unique(name, value)
    }

    /// Removes every header matching `name`, owned or in a fast slot; returns
    /// how many were removed.
    pub fn del_header(&mut self, name: &str) -> usize {
        let mut removed = self.headers.remove(name);
        if let Some(node) = self.fast.as_mut() {
            while let Some(index) = node.position(name) {
                let _ = node.clear_header(index);
                removed += 1;
            }
        }
        removed
    }

    /// Looks up a header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| self.fast.as_ref().and_then(|node| node.header(name)))
    }

    /// Iterates over every header as `(name, value)`, owned ones first.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.headers
            .iter()
            .map(|h| (h.name.as_str(), h.value.as_str()))
            .chain(self.fast.iter().flat_map(|node| node.headers()))
    }

    /// The owned header list.
    pub fn header_list(&self) -> &HeaderList {
        &self.headers
    }

    /// Replaces the owned body.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
    }

    /// The body: the owned one if set, otherwise the fast node's inline body.
    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
            .or_else(|| self.fast.as_ref().and_then(FastNode::body))
    }

    /// Removes and returns the owned body.
    pub fn take_body(&mut self) -> Option<String> {
        self.body.take()
    }

    /// Deep-copies the headers and body into a fresh, owned event.
    ///
    /// The copy never shares pool memory, carries no callback and has no
    /// pending timer.
    pub fn dup(&self) -> Self {
        let mut copy = Self::new(self.event_id, self.source_id);
        for (name, value) in self.headers() {
            copy.headers.set(name, value);
        }
        copy.body = self.body().map(str::to_owned);
        copy.debug_id = self.debug_id;
        copy
    }

    /// Returns `true` if this is a direct-delivery event.
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Takes the direct callback out of the event, leaving it a plain event.
    pub fn take_callback(&mut self) -> Option<DirectCallback> {
        self.callback.take()
    }

    /// Returns `true` if the event is backed by a pool node.
    pub fn is_fast(&self) -> bool {
        self.fast.is_some()
    }

    /// The backing pool node, if any.
    pub fn fast(&self) -> Option<&FastNode> {
        self.fast.as_ref()
    }

    /// The deadline key of the pending timer, while the event is scheduled.
    pub fn timer_key(&self) -> Option<u32> {
        self.timer_key
    }

    /// Records or clears the pending timer key. Maintained by the timer engine.
    pub fn set_timer_key(&mut self, key: Option<u32>) {
        self.timer_key = key;
    }

    /// Optional tracing id.
    pub fn debug_id(&self) -> Option<u64> {
        self.debug_id
    }

    /// Attaches a tracing id that shows up in delivery logs.
    pub fn set_debug_id(&mut self, debug_id: u64) {
        self.debug_id = Some(debug_id);
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("event_id", &self.event_id)
            .field("source_id", &self.source_id)
            .field("headers", &self.headers().collect::<Vec<_>>())
            .field("body", &self.body())
            .field("direct", &self.callback.is_some())
            .field("fast", &self.fast.as_ref().map(FastNode::tag))
            .field("timer_key", &self.timer_key)
            .field("debug_id", &self.debug_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FastPool;

    #[test]
    fn headers_and_body() {
        let mut event = Event::new(21, 0);
        event.add_header("k", "v");
        event.add_header("K", "w");
        assert!(event.add_header_checked("k", "x").is_err());
        event.add_header_checked("other", "1").unwrap();

        assert_eq!(event.header("k"), Some("w"));
        assert_eq!(event.headers().count(), 2);

        event.set_body("payload");
        assert_eq!(event.body(), Some("payload"));
        assert_eq!(event.del_header("OTHER"), 1);
        assert_eq!(event.header("other"), None);
    }

    #[test]
    fn dup_is_deep_and_plain() {
        let pool = FastPool::new(5, 1, 1, &[8], 8).unwrap();
        let mut node = pool.alloc().unwrap();
        node.set_strheader(0, "slot", "s").unwrap();
        node.set_body("fast").unwrap();

        let mut original = Event::from_fast(5, 9, node);
        original.add_header("owned", "o");
        let copy = original.dup();

        assert!(!copy.is_fast());
        assert_eq!(copy.event_id(), 5);
        assert_eq!(copy.source_id(), 9);
        assert_eq!(copy.header("slot"), Some("s"));
        assert_eq!(copy.header("owned"), Some("o"));
        assert_eq!(copy.body(), Some("fast"));

        drop(original);
        assert_eq!(pool.available(), 1);
        assert_eq!(copy.header("slot"), Some("s"));
    }

    #[test]
    fn owned_and_fast_headers_share_one_namespace() {
        let pool = FastPool::new(6, 1, 1, &[8], 0).unwrap();
        let mut node = pool.alloc().unwrap();
        node.set_strheader(0, "k", "fast").unwrap();
        let mut event = Event::from_fast(6, 2, node);

        event.add_header("K", "owned");
        assert_eq!(event.header("k"), Some("owned"));
        let named_k = event.headers().filter(|(n, _)| n.eq_ignore_ascii_case("k"));
        assert_eq!(named_k.count(), 1);
        assert!(event.header_list().is_empty());
        assert!(event.add_header_checked("k", "again").is_err());

        assert_eq!(event.del_header("k"), 1);
        assert_eq!(event.header("k"), None);
        assert_eq!(event.headers().count(), 0);

        event.add_header("k", "owned");
        assert_eq!(event.dup().header("k"), Some("owned"));
        assert_eq!(event.headers().count(), 1);
    }

    #[test]
    fn oversized_value_moves_out_of_its_fast_slot() {
        let pool = FastPool::new(6, 1, 1, &[4], 0).unwrap();
        let mut node = pool.alloc().unwrap();
        node.set_strheader(0, "k", "fast").unwrap();
        let mut event = Event::from_fast(6, 2, node);

        event.add_header("k", "much longer than four bytes");
        assert_eq!(event.header("k"), Some("much longer than four bytes"));
        assert_eq!(event.fast().and_then(|n| n.position("k")), None);
        assert_eq!(event.headers().count(), 1);

        assert_eq!(event.del_header("K"), 1);
        assert_eq!(event.headers().count(), 0);
    }

    #[test]
    fn direct_callback_is_taken_once() {
        let mut event = Event::with_callback(3, |e| e.add_header("ran", "yes"));
        assert!(event.has_callback());
        assert_eq!(event.event_id(), EVENT_ALL);

        let callback = event.take_callback().unwrap();
        callback(&mut event);
        assert!(event.take_callback().is_none());
        assert_eq!(event.header("ran"), Some("yes"));
    }
}
