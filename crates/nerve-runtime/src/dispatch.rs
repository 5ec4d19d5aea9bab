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

//! Sharded event delivery.
//!
//! The engine owns `W` shards, each a bounded queue drained by one worker
//! thread. An event goes to shard `source_id % W`, or to a random shard when
//! it has no source. One consumer per shard means events sharing a source
//! are delivered one after another, in the order they were fired.
//!
//! A panicking callback is contained to the event it was delivering: the
//! worker logs it, counts it and moves on to the next event of its shard.

use crate::config::RuntimeConfig;
use nerve_core::error::{NerveError, NerveResult};
use nerve_core::event::{Event, SourceId, NULL_SOURCE_ID};
use nerve_core::registry::{Subscription, SubscriptionRegistry};
use rand::Rng;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

enum ShardMessage {
    Deliver(Event),
    Stop,
}

/// A snapshot of the engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events accepted into a shard queue.
    pub fired: u64,
    /// Events whose delivery completed.
    pub delivered: u64,
    /// Events destroyed undelivered because shutdown had begun.
    ///
    /// Covers events refused by `fire` after shutdown and events that a
    /// racing `fire` queued behind a worker's stop marker. The latter are
    /// also counted in `fired`.
    pub dropped_at_shutdown: u64,
    /// Listener and direct-callback invocations.
    pub listener_invocations: u64,
    /// Deliveries cut short by a panicking callback.
    pub listener_panics: u64,
}

#[derive(Debug, Default)]
struct Counters {
    fired: AtomicU64,
    delivered: AtomicU64,
    dropped_at_shutdown: AtomicU64,
    listener_invocations: AtomicU64,
    listener_panics: AtomicU64,
}

/// Decrements the live-worker count when a worker exits, even by unwinding.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Delivers one event on the calling thread and destroys it.
///
/// A direct event runs its own callback once. Any other event goes to every
/// listener of its id, then to every wildcard listener; the listener lists
/// are snapshotted first, so no registry lock is held while callbacks run.
/// Dropping the event afterwards hands a fast event back to its pool.
///
/// Returns the number of callbacks invoked.
pub fn deliver(event: Event, subscriptions: &SubscriptionRegistry) -> usize {
    deliver_with(event, subscriptions, &mut Vec::new())
}

/// [`deliver`] with a caller-owned snapshot buffer, left empty on return.
fn deliver_with(
    mut event: Event,
    subscriptions: &SubscriptionRegistry,
    listeners: &mut Vec<Arc<Subscription>>,
) -> usize {
    if let Some(callback) = event.take_callback() {
        log::trace!(
            "Direct delivery (source {}, debug id {:?}).",
            event.source_id(),
            event.debug_id()
        );
        callback(&mut event);
        return 1;
    }

    subscriptions.snapshot_into(event.event_id(), listeners);
    log::trace!(
        "Delivering event {} (source {}, debug id {:?}) to {} listener(s).",
        event.event_id(),
        event.source_id(),
        event.debug_id(),
        listeners.len()
    );
    for subscription in listeners.iter() {
        subscription.invoke(&event);
    }
    let invoked = listeners.len();
    listeners.clear();
    invoked
}

/// The pool of dispatch workers.
pub struct DispatchEngine {
    shards: Vec<flume::Sender<ShardMessage>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    live_workers: Arc<AtomicUsize>,
    counters: Arc<Counters>,
    shutdown_retries: u32,
    shutdown_retry_interval: Duration,
}

impl DispatchEngine {
    /// Spawns one worker per shard.
    pub fn start(
        config: &RuntimeConfig,
        subscriptions: Arc<SubscriptionRegistry>,
    ) -> NerveResult<Self> {
        config.validate()?;
        let worker_count = config.resolved_workers();
        let idle_wait = config.idle_wait();

        let mut engine = Self {
            shards: Vec::with_capacity(worker_count),
            handles: Mutex::new(Vec::with_capacity(worker_count)),
            running: Arc::new(AtomicBool::new(true)),
            live_workers: Arc::new(AtomicUsize::new(0)),
            counters: Arc::new(Counters::default()),
            shutdown_retries: config.shutdown_retries,
            shutdown_retry_interval: config.shutdown_retry_interval(),
        };

        for index in 0..worker_count {
            let (tx, rx) = flume::bounded(config.queue_capacity);
            let running = Arc::clone(&engine.running);
            let counters = Arc::clone(&engine.counters);
            let subscriptions = Arc::clone(&subscriptions);

            engine.live_workers.fetch_add(1, Ordering::AcqRel);
            let guard = LiveGuard(Arc::clone(&engine.live_workers));

            let spawned = thread::Builder::new()
                .name(format!("nerve-dispatch-{index}"))
                .spawn(move || {
                    let _guard = guard;
                    worker_loop(index, rx, &running, &subscriptions, &counters, idle_wait);
                });

            match spawned {
                Ok(handle) => {
                    engine.shards.push(tx);
                    engine
                        .handles
                        .get_mut()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(handle);
                }
                Err(e) => {
                    engine.shutdown();
                    return Err(NerveError::Memory(format!(
                        "cannot spawn dispatch worker {index}: {e}"
                    )));
                }
            }
        }

        log::info!("Dispatch engine started with {worker_count} shards.");
        Ok(engine)
    }

    /// Number of shards.
    pub fn worker_count(&self) -> usize {
        self.shards.len()
    }

    /// Number of worker threads that have not exited yet.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// Returns `true` until [`shutdown`](Self::shutdown) is called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The shard an event from `source_id` is routed to.
    ///
    /// Deterministic for a nonzero source; random for [`NULL_SOURCE_ID`].
    pub fn shard_for(&self, source_id: SourceId) -> usize {
        let count = self.shards.len();
        if source_id != NULL_SOURCE_ID {
            source_id as usize % count
        } else {
            rand::thread_rng().gen_range(0..count)
        }
    }

    /// Queues `event` for delivery, blocking while its shard is full.
    ///
    /// After shutdown has begun the event is destroyed and `Ok` is returned.
    pub fn fire(&self, event: Event) -> NerveResult<()> {
        if !self.is_running() {
            self.drop_at_shutdown(event);
            return Ok(());
        }
        let shard = self.shard_for(event.source_id());
        match self.shards[shard].send(ShardMessage::Deliver(event)) {
            Ok(()) => {
                self.counters.fired.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(flume::SendError(message)) => self.undeliverable(shard, message),
        }
    }

    /// Queues `event` without blocking.
    ///
    /// Fails with [`NerveError::Declined`] when the shard is full; the event
    /// is dropped in that case.
    pub fn try_fire(&self, event: Event) -> NerveResult<()> {
        if !self.is_running() {
            self.drop_at_shutdown(event);
            return Ok(());
        }
        let shard = self.shard_for(event.source_id());
        match self.shards[shard].try_send(ShardMessage::Deliver(event)) {
            Ok(()) => {
                self.counters.fired.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(flume::TrySendError::Full(_)) => {
                log::debug!("Shard {shard} is full, declining event.");
                Err(NerveError::Declined(format!("shard {shard} queue is full")))
            }
            Err(flume::TrySendError::Disconnected(message)) => {
                self.undeliverable(shard, message)
            }
        }
    }

    /// Current counter values.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            fired: self.counters.fired.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped_at_shutdown: self.counters.dropped_at_shutdown.load(Ordering::Relaxed),
            listener_invocations: self.counters.listener_invocations.load(Ordering::Relaxed),
            listener_panics: self.counters.listener_panics.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting events and waits, within the configured retry budget,
    /// for the workers to drain their queues and exit.
    ///
    /// Returns `true` if every worker exited in time. Calling it again is a no-op.
    pub fn shutdown(&self) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return self.live_workers() == 0;
        }
        log::info!("Dispatch engine shutting down.");

        for shard in &self.shards {
            // A full queue is fine: the worker notices the flag once it drains.
            let _ = shard.try_send(ShardMessage::Stop);
        }

        let mut retries = 0;
        while self.live_workers() > 0 && retries < self.shutdown_retries {
            thread::sleep(self.shutdown_retry_interval);
            retries += 1;
        }

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        let (finished, stuck): (Vec<_>, Vec<_>) =
            handles.drain(..).partition(JoinHandle::is_finished);
        for handle in finished {
            if handle.join().is_err() {
                log::error!("A dispatch worker panicked.");
            }
        }

        if stuck.is_empty() {
            log::info!("Dispatch engine stopped.");
            true
        } else {
            log::warn!(
                "{} dispatch worker(s) still busy after {retries} retries; detaching.",
                stuck.len()
            );
            false
        }
    }

    fn drop_at_shutdown(&self, event: Event) {
        log::trace!(
            "Dropping event {} fired during shutdown.",
            event.event_id()
        );
        self.counters
            .dropped_at_shutdown
            .fetch_add(1, Ordering::Relaxed);
        drop(event);
    }

    fn undeliverable(&self, shard: usize, message: ShardMessage) -> NerveResult<()> {
        if let ShardMessage::Deliver(event) = message {
            if !self.is_running() {
                self.drop_at_shutdown(event);
                return Ok(());
            }
        }
        log::error!("Dispatch worker {shard} is gone.");
        Err(NerveError::Disconnected(format!(
            "dispatch shard {shard} has no worker"
        )))
    }
}

impl Drop for DispatchEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("workers", &self.shards.len())
            .field("live_workers", &self.live_workers())
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(
    index: usize,
    rx: flume::Receiver<ShardMessage>,
    running: &AtomicBool,
    subscriptions: &SubscriptionRegistry,
    counters: &Counters,
    idle_wait: Duration,
) {
    log::debug!("Dispatch worker {index} started.");
    let mut listeners = Vec::new();
    loop {
        match rx.recv_timeout(idle_wait) {
            Ok(ShardMessage::Deliver(event)) => {
                let event_id = event.event_id();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    deliver_with(event, subscriptions, &mut listeners)
                }));
                match outcome {
                    Ok(invoked) => {
                        counters
                            .listener_invocations
                            .fetch_add(invoked as u64, Ordering::Relaxed);
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(payload) => {
                        listeners.clear();
                        counters.listener_panics.fetch_add(1, Ordering::Relaxed);
                        log::error!(
                            "Dispatch worker {index}: a callback for event {event_id} panicked: {}",
                            panic_message(payload.as_ref())
                        );
                    }
                }
            }
            Ok(ShardMessage::Stop) => {
                drain_after_stop(index, &rx, counters);
                break;
            }
            Err(flume::RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("Dispatch worker {index} stopped.");
}

/// Destroys whatever a racing `fire` queued behind the stop marker.
fn drain_after_stop(index: usize, rx: &flume::Receiver<ShardMessage>, counters: &Counters) {
    let stranded = rx
        .try_iter()
        .filter(|message| matches!(message, ShardMessage::Deliver(_)))
        .count();
    if stranded > 0 {
        log::debug!("Dispatch worker {index} dropping {stranded} event(s) queued after stop.");
        counters
            .dropped_at_shutdown
            .fetch_add(stranded as u64, Ordering::Relaxed);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
