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

//! The event value type and its building blocks.
//!
//! An [`Event`] carries an id, a producer tag, a set of named headers and an
//! optional body. Ids are plain integers whose names live in the
//! [`TypeRegistry`](crate::registry::TypeRegistry).

#[allow(clippy::module_inception)]
mod event;
mod header;
mod source;

pub use self::event::{DirectCallback, Event};
pub use self::header::{Header, HeaderList};
pub use self::source::SourceAllocator;

/// Numeric event identifier.
pub type EventId = u32;

/// Producer tag used as the sharding and ordering key.
pub type SourceId = u32;

/// The wildcard channel. Listeners bound to it see every subscription event.
pub const EVENT_ALL: EventId = 0;

/// The "no producer" tag. Events carrying it are routed to a random shard.
pub const NULL_SOURCE_ID: SourceId = 0;
