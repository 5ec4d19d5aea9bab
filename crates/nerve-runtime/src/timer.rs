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

//! Deferred fires.
//!
//! Scheduled events wait in a [`TimerTree`] keyed by their deadline in
//! milliseconds since the engine started, truncated to `u32`. A single
//! thread sleeps until the earliest deadline (or until a new timer is
//! added), pops every expired event and hands it to
//! [`DispatchEngine::fire`].

use crate::config::RuntimeConfig;
use crate::dispatch::DispatchEngine;
use nerve_core::error::{NerveError, NerveResult};
use nerve_core::event::Event;
use nerve_core::timer::{TimerSlot, TimerTree};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest accepted delay. Deadlines further out would not order correctly
/// against the wrapping millisecond clock.
pub const MAX_DELAY_MS: u32 = i32::MAX as u32;

/// Refers to one pending timer.
///
/// A handle goes stale once its timer fires, is cancelled or is re-armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    slot: TimerSlot,
}

struct TimerState {
    tree: TimerTree<Event>,
    running: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
    epoch: Instant,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Milliseconds since start, wrapping every ~49.7 days.
    fn now_key(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}

/// The timer thread and its deadline tree.
pub struct TimerEngine {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerEngine {
    /// Starts the timer thread; expired events are fired through `dispatch`.
    pub fn start(config: &RuntimeConfig, dispatch: Arc<DispatchEngine>) -> NerveResult<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                tree: TimerTree::new(),
                running: true,
            }),
            wakeup: Condvar::new(),
            epoch: Instant::now(),
        });

        let thread_shared = Arc::clone(&shared);
        let idle = config.timer_idle();
        let handle = thread::Builder::new()
            .name("nerve-timer".into())
            .spawn(move || timer_loop(&thread_shared, &dispatch, idle))
            .map_err(|e| NerveError::Memory(format!("cannot spawn timer thread: {e}")))?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Schedules `event` to be fired after `delay_ms` milliseconds.
    pub fn add_timer(&self, mut event: Event, delay_ms: u32) -> NerveResult<TimerHandle> {
        check_delay(delay_ms)?;
        let mut state = self.shared.lock();
        if !state.running {
            return Err(NerveError::Declined("timer engine is stopped".into()));
        }
        let key = self.shared.now_key().wrapping_add(delay_ms);
        event.set_timer_key(Some(key));
        log::trace!(
            "Timer for event {} armed at {key} (+{delay_ms} ms).",
            event.event_id()
        );
        let slot = state.tree.insert(key, event);
        drop(state);
        self.shared.wakeup.notify_one();
        Ok(TimerHandle { slot })
    }

    /// Moves a pending timer to `delay_ms` from now.
    ///
    /// The previous schedule is removed first, so the event fires once, at the
    /// new deadline. The returned handle replaces `handle`.
    pub fn rearm(&self, handle: TimerHandle, delay_ms: u32) -> NerveResult<TimerHandle> {
        check_delay(delay_ms)?;
        let mut state = self.shared.lock();
        let (_, mut event) = state.tree.remove(handle.slot).ok_or_else(|| {
            NerveError::Declined("timer already fired or was cancelled".into())
        })?;
        let key = self.shared.now_key().wrapping_add(delay_ms);
        event.set_timer_key(Some(key));
        log::trace!(
            "Timer for event {} re-armed at {key} (+{delay_ms} ms).",
            event.event_id()
        );
        let slot = state.tree.insert(key, event);
        drop(state);
        self.shared.wakeup.notify_one();
        Ok(TimerHandle { slot })
    }

    /// Cancels a pending timer and gives its event back.
    ///
    /// Returns `None` if the timer already fired or was cancelled.
    pub fn del_timer(&self, handle: TimerHandle) -> Option<Event> {
        let (_, mut event) = self.shared.lock().tree.remove(handle.slot)?;
        event.set_timer_key(None);
        Some(event)
    }

    /// The deadline key of a pending timer.
    pub fn deadline(&self, handle: TimerHandle) -> Option<u32> {
        self.shared.lock().tree.key(handle.slot)
    }

    /// Number of pending timers.
    pub fn pending_timers(&self) -> usize {
        self.shared.lock().tree.len()
    }

    /// Stops the thread. Pending timers are discarded without firing.
    pub fn shutdown(&self) {
        let discarded = {
            let mut state = self.shared.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.tree.drain()
        };
        self.shared.wakeup.notify_all();
        if !discarded.is_empty() {
            log::debug!("Discarding {} pending timer(s).", discarded.len());
        }
        drop(discarded);

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("The timer thread panicked.");
            }
        }
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("pending", &self.pending_timers())
            .finish()
    }
}

fn check_delay(delay_ms: u32) -> NerveResult<()> {
    if delay_ms > MAX_DELAY_MS {
        return Err(NerveError::InvalidArgument(format!(
            "timer delay {delay_ms} ms exceeds {MAX_DELAY_MS} ms"
        )));
    }
    Ok(())
}

fn timer_loop(shared: &Shared, dispatch: &DispatchEngine, idle: Duration) {
    log::info!("Timer thread started.");
    let mut state = shared.lock();
    while state.running {
        let now = shared.now_key();
        let mut expired = Vec::new();
        while let Some((_, mut event)) = state.tree.pop_expired(now) {
            event.set_timer_key(None);
            expired.push(event);
        }

        if !expired.is_empty() {
            // `fire` may block on a full shard; never hold the tree meanwhile.
            drop(state);
            for event in expired {
                if let Err(e) = dispatch.fire(event) {
                    log::error!("Failed to fire expired timer: {e}");
                }
            }
            state = shared.lock();
            continue;
        }

        let wait = match state.tree.min() {
            Some((_, key)) => Duration::from_millis(u64::from(key.wrapping_sub(now)).max(1)),
            None => idle,
        };
        state = shared
            .wakeup
            .wait_timeout(state, wait)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
    log::info!("Timer thread stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use nerve_core::registry::{listener, SubscriptionRegistry};

    fn engines() -> (Arc<SubscriptionRegistry>, Arc<DispatchEngine>, TimerEngine) {
        let config = RuntimeConfig {
            worker_count: Some(2),
            ..RuntimeConfig::default()
        };
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let dispatch =
            Arc::new(DispatchEngine::start(&config, Arc::clone(&subscriptions)).unwrap());
        let timers = TimerEngine::start(&config, Arc::clone(&dispatch)).unwrap();
        (subscriptions, dispatch, timers)
    }

    #[test]
    fn expired_timer_fires_once() {
        let (subscriptions, _dispatch, timers) = engines();
        let (tx, rx) = flume::unbounded();
        subscriptions.bind(
            "t",
            3,
            listener(move |e| {
                let _ = tx.send(e.timer_key());
            }),
        );

        let start = Instant::now();
        timers.add_timer(Event::new(3, 1), 30).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).ok(), Some(None));
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(timers.pending_timers(), 0);
    }

    #[test]
    fn cancel_returns_the_event() {
        let (_subscriptions, _dispatch, timers) = engines();
        let mut event = Event::new(4, 0);
        event.add_header("k", "v");
        let handle = timers.add_timer(event, 10_000).unwrap();
        assert!(timers.deadline(handle).is_some());

        let event = timers.del_timer(handle).unwrap();
        assert_eq!(event.header("k"), Some("v"));
        assert_eq!(event.timer_key(), None);
        assert!(timers.del_timer(handle).is_none());
        assert!(timers.rearm(handle, 5).is_err());
    }

    #[test]
    fn rearm_invalidates_the_old_handle() {
        let (_subscriptions, _dispatch, timers) = engines();
        let first = timers.add_timer(Event::new(5, 0), 10_000).unwrap();
        let second = timers.rearm(first, 20_000).unwrap();

        assert_eq!(timers.pending_timers(), 1);
        assert!(timers.del_timer(first).is_none());
        assert!(timers.del_timer(second).is_some());
    }

    #[test]
    fn oversized_delay_and_stopped_engine_are_rejected() {
        let (_subscriptions, _dispatch, timers) = engines();
        assert!(timers.add_timer(Event::new(1, 0), u32::MAX).is_err());

        timers.add_timer(Event::new(1, 0), 60_000).unwrap();
        timers.shutdown();
        assert_eq!(timers.pending_timers(), 0);
        assert!(timers.add_timer(Event::new(1, 0), 1).is_err());
    }
}
