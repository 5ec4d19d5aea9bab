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

//! Runtime configuration.

use anyhow::Context as _;
use nerve_core::error::{NerveError, NerveResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables of a [`Runtime`](crate::Runtime).
///
/// Every field has a default, so a JSON file only needs to list the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of dispatch shards. `None` uses twice the available
    /// parallelism plus one.
    pub worker_count: Option<usize>,
    /// Bound of each shard queue. A full queue blocks `fire`.
    pub queue_capacity: usize,
    /// How long an idle worker waits for an event before re-checking the
    /// running flag, in milliseconds.
    pub idle_wait_ms: u64,
    /// How long the timer thread sleeps when no timer is pending, in milliseconds.
    pub timer_idle_ms: u64,
    /// How many times shutdown polls for workers to exit.
    pub shutdown_retries: u32,
    /// Pause between two shutdown polls, in milliseconds.
    pub shutdown_retry_interval_ms: u64,
    /// Default log filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            queue_capacity: 4096,
            idle_wait_ms: 10,
            timer_idle_ms: 50,
            shutdown_retries: 100,
            shutdown_retry_interval_ms: 10,
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json_str(json: &str) -> NerveResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading runtime config {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("parsing runtime config {}", path.display()))
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> NerveResult<()> {
        if let Some(count) = self.worker_count {
            if count < 2 {
                return Err(NerveError::InvalidArgument(format!(
                    "worker_count must be at least 2, got {count}"
                )));
            }
        }
        if self.queue_capacity == 0 {
            return Err(NerveError::InvalidArgument(
                "queue_capacity must be non-zero".into(),
            ));
        }
        if self.idle_wait_ms == 0 || self.timer_idle_ms == 0 {
            return Err(NerveError::InvalidArgument(
                "idle waits must be at least 1 ms".into(),
            ));
        }
        Ok(())
    }

    /// The number of dispatch shards this configuration yields.
    pub fn resolved_workers(&self) -> usize {
        self.worker_count.unwrap_or_else(|| {
            let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
            (2 * cpus + 1).max(2)
        })
    }

    pub(crate) fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub(crate) fn timer_idle(&self) -> Duration {
        Duration::from_millis(self.timer_idle_ms)
    }

    pub(crate) fn shutdown_retry_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nerve_core::error::Status;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.queue_capacity, 4096);
        assert_eq!(config.log_filter, "info");
        assert!(config.validate().is_ok());
        assert!(config.resolved_workers() >= 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{ "worker_count": 4, "queue_capacity": 8 }"#)
            .unwrap();
        assert_eq!(config.resolved_workers(), 4);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.timer_idle_ms, 50);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for json in [
            r#"{ "worker_count": 1 }"#,
            r#"{ "queue_capacity": 0 }"#,
            r#"{ "idle_wait_ms": 0 }"#,
        ] {
            let err = RuntimeConfig::from_json_str(json).unwrap_err();
            assert_eq!(err.status(), Status::GenErr, "{json}");
        }
        assert!(RuntimeConfig::from_json_str("{ nope").is_err());
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = RuntimeConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("reading runtime config"));
    }
}
