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

//! # Nerve Core
//!
//! Foundational crate of the event bus: the event model, the type and
//! subscription registries, fast-event pools, the deadline tree used by the
//! timer engine, and the JSON wire codec.
//!
//! Nothing in this crate spawns threads. The registries are `Sync` and meant
//! to be shared behind an `Arc`; `nerve-runtime` adds the dispatch workers
//! and the timer thread on top.

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod event;
pub mod pool;
pub mod registry;
pub mod timer;

pub use error::{NerveError, NerveResult, Status};
pub use event::{Event, EventId, SourceId, EVENT_ALL, NULL_SOURCE_ID};
pub use pool::{FastNode, FastPool, FastPools};
pub use registry::{EventCallback, SubscriptionHandle, SubscriptionRegistry, TypeRegistry};
