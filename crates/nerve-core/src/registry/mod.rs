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

//! Id-to-name and id-to-listener tables.
//!
//! Both registries are guarded by reader/writer locks: delivery only ever
//! reads, while registration and binding take the write side.

mod subscription;
mod types;

pub use self::subscription::{
    listener, EventCallback, Subscription, SubscriptionHandle, SubscriptionRegistry,
};
pub use self::types::{TypeRegistry, ALL_EVENT_NAME};
