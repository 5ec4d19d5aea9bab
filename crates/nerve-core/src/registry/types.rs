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

use crate::error::{NerveError, NerveResult};
use crate::event::{EventId, EVENT_ALL};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Name under which the wildcard id is pre-registered.
pub const ALL_EVENT_NAME: &str = "ALL";

#[derive(Debug, Default)]
struct TypeTable {
    names: HashMap<EventId, String>,
    ids: HashMap<String, EventId>,
}

/// Maps event ids to human-readable names.
///
/// An id can be named exactly once; a second registration of the same id
/// fails and leaves the first name in place. Names are unique as well, so
/// [`get_id`](TypeRegistry::get_id) is unambiguous.
#[derive(Debug)]
pub struct TypeRegistry {
    table: RwLock<TypeTable>,
}

impl TypeRegistry {
    /// Creates a registry that already knows the wildcard id.
    pub fn new() -> Self {
        let mut table = TypeTable::default();
        table.names.insert(EVENT_ALL, ALL_EVENT_NAME.to_string());
        table.ids.insert(ALL_EVENT_NAME.to_string(), EVENT_ALL);
        Self {
            table: RwLock::new(table),
        }
    }

    /// Names `id`.
    pub fn register(&self, id: EventId, name: &str) -> NerveResult<()> {
        if name.is_empty() {
            return Err(NerveError::InvalidArgument("event name is empty".into()));
        }
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = table.names.get(&id) {
            return Err(NerveError::AlreadyRegistered {
                id,
                name: existing.clone(),
            });
        }
        if let Some(other) = table.ids.get(name) {
            return Err(NerveError::InvalidArgument(format!(
                "event name '{name}' is already used by id {other}"
            )));
        }
        table.names.insert(id, name.to_string());
        table.ids.insert(name.to_string(), id);
        log::debug!("Registered event {id} as '{name}'.");
        Ok(())
    }

    /// Looks up the id registered under `name`.
    pub fn get_id(&self, name: &str) -> Option<EventId> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .get(name)
            .copied()
    }

    /// Looks up the name of `id`.
    pub fn get_name(&self, id: EventId) -> Option<String> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .get(&id)
            .cloned()
    }

    /// Returns `true` if `id` has a name.
    pub fn contains(&self, id: EventId) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .contains_key(&id)
    }

    /// Number of named ids, the wildcard included.
    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .len()
    }

    /// Always `false`: the wildcard id is registered from the start.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
