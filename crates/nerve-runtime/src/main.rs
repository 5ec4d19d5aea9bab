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

//! Small end-to-end run of the event bus.
//!
//! Usage: `nerve-runtime [config.json]`

use anyhow::{Context, Result};
use nerve_core::event::{Event, EVENT_ALL};
use nerve_core::registry::listener;
use nerve_runtime::{init_logging, Runtime, RuntimeConfig};
use std::time::Duration;

const EVENT_TICK: u32 = 21;
const EVENT_SAMPLE: u32 = 22;
const SAMPLE_POOL: u32 = 1;

fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::from_file(&path)?,
        None => RuntimeConfig::default(),
    };
    init_logging(&config.log_filter);

    let runtime = Runtime::init(config).context("starting the runtime")?;
    runtime.register(EVENT_TICK, "tick")?;
    runtime.register(EVENT_SAMPLE, "sample")?;

    let (tx, rx) = flume::unbounded::<String>();
    let ticks = tx.clone();
    runtime.bind(
        "demo.ticks",
        EVENT_TICK,
        listener(move |e| {
            let _ = ticks.send(format!("tick #{}", e.header("seq").unwrap_or("?")));
        }),
    )?;
    let samples = tx.clone();
    runtime.bind(
        "demo.samples",
        EVENT_SAMPLE,
        listener(move |e| {
            let _ = samples.send(format!(
                "sample {}={}",
                e.header("sensor").unwrap_or("?"),
                e.header("value").unwrap_or("?")
            ));
        }),
    )?;
    let audit = runtime.bind_removable(
        "demo.audit",
        EVENT_ALL,
        listener(|e| log::debug!("audit: event {} from source {}", e.event_id(), e.source_id())),
    )?;
    drop(tx);

    let source = runtime.alloc_source();
    for seq in 0..5 {
        let mut event = Event::new(EVENT_TICK, source);
        event.add_header("seq", seq.to_string());
        runtime.fire(event)?;
    }

    runtime.fast_initial(SAMPLE_POOL, 8, 2, &[16, 20], 0)?;
    let mut node = runtime.fast_alloc(SAMPLE_POOL)?;
    node.set_strheader(0, "sensor", "thermal")?;
    node.set_intheader(1, "value", -4)?;
    runtime.fire(Event::from_fast(EVENT_SAMPLE, source, node))?;

    let mut delayed = Event::new(EVENT_TICK, source);
    delayed.add_header("seq", "delayed");
    let timer = runtime.add_timer(delayed, 200)?;
    runtime.rearm(timer, 50)?;

    let mut wire = Event::new(EVENT_SAMPLE, 0);
    wire.add_header("sensor", "cpu");
    wire.set_body("{\"load\":0.42}");
    let json = runtime.to_json_string(&wire)?;
    log::info!("Wire form: {json}");
    runtime.fire(runtime.from_json_str(&json)?)?;

    while let Ok(line) = rx.recv_timeout(Duration::from_millis(500)) {
        log::info!("{line}");
    }

    runtime.unbind(audit)?;
    log::info!("Dispatch stats: {:?}", runtime.stats());
    runtime.shutdown();
    Ok(())
}
