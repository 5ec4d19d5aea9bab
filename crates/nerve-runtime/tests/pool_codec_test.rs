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

use nerve_core::error::{NerveError, Status};
use nerve_core::event::Event;
use nerve_core::registry::listener;
use nerve_runtime::{Runtime, RuntimeConfig};
use std::collections::HashMap;
use std::time::Duration;

fn runtime() -> Runtime {
    Runtime::init(RuntimeConfig {
        worker_count: Some(2),
        ..RuntimeConfig::default()
    })
    .expect("runtime should start")
}

#[test]
fn test_fast_pool_capacity_is_a_hard_bound() {
    // --- 1. ARRANGE ---
    let runtime = runtime();
    runtime.fast_initial(1, 2, 1, &[8], 16).unwrap();

    // --- 2. ACT ---
    let first = runtime.fast_alloc(1).unwrap();
    let _second = runtime.fast_alloc(1).unwrap();
    let third = runtime.fast_alloc(1);

    // --- 3. ASSERT ---
    let err = third.expect_err("a third allocation must fail");
    assert_eq!(err.status(), Status::GenErr);

    runtime.fast_release(first).unwrap();
    let fourth = runtime.fast_alloc(1);
    assert!(fourth.is_ok(), "releasing one node frees exactly one slot");
    assert!(runtime.fast_alloc(1).is_err());
}

#[test]
fn test_fast_event_returns_to_its_pool_after_delivery() {
    // --- 1. ARRANGE ---
    let runtime = runtime();
    runtime.register(70, "fast").unwrap();
    let pool = runtime.fast_initial(2, 1, 2, &[8, 20], 32).unwrap();
    let (tx, rx) = flume::unbounded();
    runtime
        .bind(
            "fast",
            70,
            listener(move |e| {
                let _ = tx.send((
                    e.header("name").map(str::to_owned),
                    e.header("count").map(str::to_owned),
                    e.body().map(str::to_owned),
                ));
            }),
        )
        .unwrap();

    let mut node = runtime.fast_alloc(2).unwrap();
    node.set_strheader(0, "name", "gauge").unwrap();
    node.set_uintheader(1, "count", 3).unwrap();
    node.set_body("inline").unwrap();
    assert_eq!(pool.available(), 0);

    // --- 2. ACT ---
    runtime.fire(Event::from_fast(70, 1, node)).unwrap();

    // --- 3. ASSERT ---
    let (name, count, body) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(name.as_deref(), Some("gauge"));
    assert_eq!(count.as_deref(), Some("3"));
    assert_eq!(body.as_deref(), Some("inline"));

    let start = std::time::Instant::now();
    while pool.available() == 0 && start.elapsed() < Duration::from_secs(2) {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(pool.available(), 1, "the node should be back in its pool");
    assert!(runtime.fast_alloc(2).is_ok());
}

#[test]
fn test_json_round_trip_preserves_id_body_and_headers() {
    let runtime = runtime();
    runtime.register(21, "test_event").unwrap();

    let mut event = Event::new(21, 0);
    event.add_header("alpha", "1");
    event.add_header("beta", "two words");
    event.set_body("line one\nline two");

    let value = runtime.serialize(&event);
    assert_eq!(value["_name"], "test_event");
    assert_eq!(value["_length"], "17");

    let back = runtime.deserialize(&value).unwrap();
    let headers = |e: &Event| -> HashMap<String, String> {
        e.headers()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    };
    assert_eq!(back.event_id(), event.event_id());
    assert_eq!(back.body(), event.body());
    assert_eq!(headers(&back), headers(&event));
}

#[test]
fn test_unregistered_or_malformed_payloads_are_dropped() {
    let runtime = runtime();
    let err = runtime.from_json_str(r#"{"_id":"99","k":"v"}"#).unwrap_err();
    assert_eq!(err.status(), Status::False);

    let err = runtime.from_json_str("not json").unwrap_err();
    assert!(matches!(err, NerveError::Codec(_)));
    assert_eq!(err.status(), Status::False);
}

#[test]
fn test_event_id_cannot_be_renamed() {
    let runtime = runtime();
    runtime.register(21, "A").unwrap();

    let err = runtime.register(21, "B").unwrap_err();

    assert_eq!(err.status(), Status::GenErr);
    assert_eq!(runtime.get_name(21).as_deref(), Some("A"));
    assert_eq!(runtime.get_id("A"), Some(21));
    assert_eq!(runtime.get_id("B"), None);
}
