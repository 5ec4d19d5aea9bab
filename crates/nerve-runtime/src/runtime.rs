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

//! The runtime context tying registries, pools, dispatch and timers together.

use crate::config::RuntimeConfig;
use crate::dispatch::{DispatchEngine, DispatchStats};
use crate::timer::{TimerEngine, TimerHandle};
use nerve_core::codec;
use nerve_core::error::{NerveError, NerveResult};
use nerve_core::event::{Event, EventId, SourceAllocator, SourceId};
use nerve_core::pool::{FastNode, FastPool, FastPools};
use nerve_core::registry::{EventCallback, SubscriptionHandle, SubscriptionRegistry, TypeRegistry};
use serde_json::Value;
use std::sync::Arc;

/// One independent event bus.
///
/// Every piece of state lives here rather than in globals, so several
/// runtimes can coexist in one process. [`Runtime::init`] starts the dispatch
/// workers and the timer thread; [`Runtime::shutdown`] (or dropping the
/// runtime) stops them.
pub struct Runtime {
    config: RuntimeConfig,
    types: Arc<TypeRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    sources: SourceAllocator,
    pools: FastPools,
    dispatch: Arc<DispatchEngine>,
    timers: TimerEngine,
}

impl Runtime {
    /// Builds the registries and starts the worker and timer threads.
    pub fn init(config: RuntimeConfig) -> NerveResult<Self> {
        config.validate()?;
        let types = Arc::new(TypeRegistry::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let dispatch = Arc::new(DispatchEngine::start(&config, Arc::clone(&subscriptions))?);
        let timers = TimerEngine::start(&config, Arc::clone(&dispatch))?;

        log::info!(
            "Runtime initialized ({} dispatch shards, queue capacity {}).",
            dispatch.worker_count(),
            config.queue_capacity
        );

        Ok(Self {
            config,
            types,
            subscriptions,
            sources: SourceAllocator::default(),
            pools: FastPools::new(),
            dispatch,
            timers,
        })
    }

    /// Stops timers first, then the dispatch workers.
    ///
    /// Afterwards `fire` destroys events instead of queueing them. Returns
    /// `true` if every worker exited within the retry budget.
    pub fn shutdown(&self) -> bool {
        if !self.dispatch.is_running() {
            return self.dispatch.live_workers() == 0;
        }
        log::info!("Runtime shutting down.");
        self.timers.shutdown();
        let drained = self.dispatch.shutdown();
        log::info!("Runtime stopped.");
        drained
    }

    /// The configuration the runtime was started with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // --- Type registry ---

    /// Names an event id. An id can only be named once.
    pub fn register(&self, id: EventId, name: &str) -> NerveResult<()> {
        self.types.register(id, name)
    }

    /// The id registered under `name`.
    pub fn get_id(&self, name: &str) -> Option<EventId> {
        self.types.get_id(name)
    }

    /// The name of `id`.
    pub fn get_name(&self, id: EventId) -> Option<String> {
        self.types.get_name(id)
    }

    /// The type registry.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // --- Subscriptions ---

    /// Binds a listener to a registered event id (or to the wildcard).
    pub fn bind(&self, id: &str, event_id: EventId, callback: EventCallback) -> NerveResult<()> {
        self.bind_removable(id, event_id, callback).map(|_| ())
    }

    /// Binds a listener and returns the handle that removes it.
    pub fn bind_removable(
        &self,
        id: &str,
        event_id: EventId,
        callback: EventCallback,
    ) -> NerveResult<SubscriptionHandle> {
        if !self.types.contains(event_id) {
            return Err(NerveError::UnknownEvent(event_id));
        }
        Ok(self.subscriptions.bind_removable(id, event_id, callback))
    }

    /// Removes one binding.
    pub fn unbind(&self, handle: SubscriptionHandle) -> NerveResult<()> {
        self.subscriptions.unbind(handle)
    }

    /// Removes, from every id, the first binding using `callback`.
    pub fn unbind_by_callback(&self, callback: &EventCallback) -> usize {
        self.subscriptions.unbind_by_callback(callback)
    }

    /// The subscription registry.
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    // --- Producers ---

    /// Hands out a fresh source id for ordered firing.
    pub fn alloc_source(&self) -> SourceId {
        self.sources.alloc_source()
    }

    /// Queues an event, blocking while its shard is full.
    pub fn fire(&self, event: Event) -> NerveResult<()> {
        self.dispatch.fire(event)
    }

    /// Queues an event, failing with `Declined` when its shard is full.
    pub fn try_fire(&self, event: Event) -> NerveResult<()> {
        self.dispatch.try_fire(event)
    }

    /// The dispatch engine.
    pub fn dispatch(&self) -> &DispatchEngine {
        &self.dispatch
    }

    /// Dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        self.dispatch.stats()
    }

    // --- Timers ---

    /// Fires `event` after `delay_ms` milliseconds.
    pub fn add_timer(&self, event: Event, delay_ms: u32) -> NerveResult<TimerHandle> {
        self.timers.add_timer(event, delay_ms)
    }

    /// Moves a pending timer; the old handle becomes stale.
    pub fn rearm(&self, handle: TimerHandle, delay_ms: u32) -> NerveResult<TimerHandle> {
        self.timers.rearm(handle, delay_ms)
    }

    /// Cancels a pending timer and returns its event.
    pub fn del_timer(&self, handle: TimerHandle) -> Option<Event> {
        self.timers.del_timer(handle)
    }

    /// Number of pending timers.
    pub fn pending_timers(&self) -> usize {
        self.timers.pending_timers()
    }

    // --- Fast pools ---

    /// Creates the fast pool for `type_tag`.
    pub fn fast_initial(
        &self,
        type_tag: u32,
        capacity: usize,
        header_count: usize,
        value_lengths: &[usize],
        body_length: usize,
    ) -> NerveResult<Arc<FastPool>> {
        self.pools
            .fast_initial(type_tag, capacity, header_count, value_lengths, body_length)
    }

    /// Takes a node from the pool of `type_tag`.
    pub fn fast_alloc(&self, type_tag: u32) -> NerveResult<FastNode> {
        self.pools.fast_alloc(type_tag)
    }

    /// Gives a node back to its pool.
    pub fn fast_release(&self, node: FastNode) -> NerveResult<()> {
        self.pools.fast_release(node)
    }

    // --- Codec ---

    /// Converts an event to its JSON object form.
    pub fn serialize(&self, event: &Event) -> Value {
        codec::serialize(event, &self.types)
    }

    /// Rebuilds an event from its JSON object form.
    pub fn deserialize(&self, value: &Value) -> NerveResult<Event> {
        codec::deserialize(value, &self.types)
    }

    /// Converts an event to JSON text.
    pub fn to_json_string(&self, event: &Event) -> NerveResult<String> {
        codec::to_json_string(event, &self.types)
    }

    /// Rebuilds an event from JSON text.
    pub fn from_json_str(&self, text: &str) -> NerveResult<Event> {
        codec::from_json_str(text, &self.types)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("event_types", &self.types.len())
            .field("fast_pools", &self.pools.len())
            .field("dispatch", &self.dispatch)
            .field("timers", &self.timers)
            .finish()
    }
}
