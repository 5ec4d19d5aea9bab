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

use nerve_core::event::Event;
use nerve_core::registry::listener;
use nerve_runtime::{Runtime, RuntimeConfig};
use std::time::{Duration, Instant};

fn runtime_with_listener(event_id: u32) -> (Runtime, flume::Receiver<(Instant, String)>) {
    let runtime = Runtime::init(RuntimeConfig {
        worker_count: Some(2),
        ..RuntimeConfig::default()
    })
    .expect("runtime should start");
    runtime.register(event_id, "timed").unwrap();
    let (tx, rx) = flume::unbounded();
    runtime
        .bind(
            "timed",
            event_id,
            listener(move |e| {
                let tag = e.header("tag").unwrap_or_default().to_string();
                let _ = tx.send((Instant::now(), tag));
            }),
        )
        .unwrap();
    (runtime, rx)
}

#[test]
fn test_rearmed_timer_fires_once_at_the_new_deadline() {
    // --- 1. ARRANGE ---
    let (runtime, rx) = runtime_with_listener(60);
    let mut event = Event::new(60, 0);
    event.add_header("tag", "rearmed");

    // --- 2. ACT ---
    let start = Instant::now();
    let handle = runtime.add_timer(event, 50).unwrap();
    runtime.rearm(handle, 400).unwrap();

    // --- 3. ASSERT ---
    assert!(
        rx.recv_timeout(Duration::from_millis(250)).is_err(),
        "the cancelled 50 ms schedule must not fire"
    );
    let (fired_at, tag) = rx
        .recv_timeout(Duration::from_secs(3))
        .expect("the re-armed schedule should fire");
    assert_eq!(tag, "rearmed");
    assert!(fired_at.duration_since(start) >= Duration::from_millis(390));
    assert!(
        rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "exactly one fire per schedule"
    );
    assert_eq!(runtime.pending_timers(), 0);
}

#[test]
fn test_timers_fire_in_deadline_order() {
    // --- 1. ARRANGE ---
    let (runtime, rx) = runtime_with_listener(61);
    // Same source so delivery order equals fire order.
    let source = runtime.alloc_source();

    // --- 2. ACT ---
    for (tag, delay) in [("c", 150), ("a", 30), ("b", 90)] {
        let mut event = Event::new(61, source);
        event.add_header("tag", tag);
        runtime.add_timer(event, delay).unwrap();
    }
    assert_eq!(runtime.pending_timers(), 3);

    // --- 3. ASSERT ---
    let tags: Vec<String> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(3)).unwrap().1)
        .collect();
    assert_eq!(tags, ["a", "b", "c"]);
}

#[test]
fn test_cancelled_timer_never_fires() {
    let (runtime, rx) = runtime_with_listener(62);
    let handle = runtime.add_timer(Event::new(62, 0), 40).unwrap();

    let event = runtime.del_timer(handle).expect("timer should still be pending");
    assert_eq!(event.event_id(), 62);
    assert!(runtime.rearm(handle, 10).is_err());
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_zero_delay_fires_promptly() {
    let (runtime, rx) = runtime_with_listener(63);
    runtime.add_timer(Event::new(63, 0), 0).unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
}
