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

use super::SourceId;
use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out producer tags.
///
/// Tags increase monotonically and wrap to 0 after `u32::MAX`. They only
/// serve as sharding keys: two events with the same tag are delivered in the
/// order they were fired.
#[derive(Debug, Default)]
pub struct SourceAllocator {
    last: AtomicU32,
}

impl SourceAllocator {
    /// Creates an allocator whose first tag is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next tag.
    pub fn alloc_source(&self) -> SourceId {
        // Atomic adds wrap on overflow, which gives the MAX -> 0 rollover.
        self.last.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }
}
