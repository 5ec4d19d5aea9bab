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

//! Named attributes carried by an event.

use crate::error::{NerveError, NerveResult};

/// A single `(name, value)` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// The attribute name. Lookups compare it ASCII case-insensitively.
    pub name: String,
    /// The attribute value.
    pub value: String,
}

impl Header {
    /// Creates a new header.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    #[inline]
    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Ordered header storage with case-insensitive, unique names.
///
/// Appending is amortised O(1); lookups are a linear scan, which is cheaper
/// than hashing for the handful of headers a typical event carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<Header>,
}

impl HeaderList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`.
    ///
    /// An existing header with the same name keeps its position and has its
    /// value replaced, so the most recent call wins.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|h| h.matches(&name)) {
            Some(existing) => existing.value = value,
            None => self.entries.push(Header { name, value }),
        }
    }

    /// Appends `name = value` only if no header of that name exists yet.
    ///
    /// Returns [`NerveError::Declined`] and leaves the list untouched when the
    /// name is already present.
    pub fn insert_unique(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> NerveResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(NerveError::Declined(format!(
                "header '{name}' is already set"
            )));
        }
        self.entries.push(Header::new(name, value));
        Ok(())
    }

    /// Removes every header matching `name` and returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|h| !h.matches(name));
        before - self.entries.len()
    }

    /// Returns the value of the header matching `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.matches(name))
            .map(|h| h.value.as_str())
    }

    /// Returns `true` if a header named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|h| h.matches(name))
    }

    /// Iterates over the headers in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.entries.iter()
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes all headers.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
