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

//! # Nerve Runtime
//!
//! Threads on top of `nerve-core`: the sharded dispatch engine, the timer
//! thread, and the [`Runtime`] context that owns them together with the
//! registries and fast pools.

#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod runtime;
pub mod timer;

pub use config::RuntimeConfig;
pub use dispatch::{deliver, DispatchEngine, DispatchStats};
pub use logging::init_logging;
pub use runtime::Runtime;
pub use timer::{TimerEngine, TimerHandle, MAX_DELAY_MS};

pub use nerve_core;
