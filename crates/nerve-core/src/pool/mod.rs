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

//! Allocation-free event storage for hot paths.
//!
//! A [`FastPool`] preallocates a fixed number of blocks sized by a
//! [`FastLayout`]; a [`FastNode`] is one of those blocks on loan. The
//! [`FastPools`] registry maps a type tag to its pool so producers can
//! allocate by tag.

mod layout;
mod node;
#[allow(clippy::module_inception)]
mod pool;

pub use self::layout::{FastLayout, FAST_NAME_CAPACITY};
pub use self::node::FastNode;
pub use self::pool::FastPool;

use crate::error::{NerveError, NerveResult};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry of fast pools keyed by type tag.
#[derive(Debug, Default)]
pub struct FastPools {
    pools: RwLock<HashMap<u32, Arc<FastPool>>>,
}

impl FastPools {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and registers the pool for `type_tag`.
    ///
    /// A tag can only be initialised once.
    pub fn fast_initial(
        &self,
        type_tag: u32,
        capacity: usize,
        header_count: usize,
        value_lengths: &[usize],
        body_length: usize,
    ) -> NerveResult<Arc<FastPool>> {
        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        if pools.contains_key(&type_tag) {
            return Err(NerveError::InvalidArgument(format!(
                "fast pool for tag {type_tag} already exists"
            )));
        }
        let pool = Arc::new(FastPool::new(
            type_tag,
            capacity,
            header_count,
            value_lengths,
            body_length,
        )?);
        pools.insert(type_tag, Arc::clone(&pool));
        Ok(pool)
    }

    /// Allocates a node from the pool registered for `type_tag`.
    pub fn fast_alloc(&self, type_tag: u32) -> NerveResult<FastNode> {
        self.get(type_tag)
            .ok_or(NerveError::UnknownPool(type_tag))?
            .alloc()
    }

    /// Releases a node back to its pool.
    pub fn fast_release(&self, node: FastNode) -> NerveResult<()> {
        let pool = self
            .get(node.tag())
            .ok_or(NerveError::UnknownPool(node.tag()))?;
        pool.release(node)
    }

    /// Returns the pool registered for `type_tag`.
    pub fn get(&self, type_tag: u32) -> Option<Arc<FastPool>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_tag)
            .cloned()
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no pool is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    #[test]
    fn registry_routes_by_tag() {
        let pools = FastPools::new();
        pools.fast_initial(10, 1, 1, &[4], 0).unwrap();
        pools.fast_initial(11, 1, 0, &[], 8).unwrap();
        assert_eq!(pools.len(), 2);

        let node = pools.fast_alloc(10).unwrap();
        assert_eq!(node.tag(), 10);
        assert_eq!(pools.fast_alloc(10).unwrap_err().status(), Status::GenErr);

        pools.fast_release(node).unwrap();
        assert!(pools.fast_alloc(10).is_ok());
    }

    #[test]
    fn duplicate_and_unknown_tags_fail() {
        let pools = FastPools::new();
        pools.fast_initial(1, 1, 0, &[], 0).unwrap();
        assert!(pools.fast_initial(1, 4, 0, &[], 0).is_err());
        assert!(matches!(
            pools.fast_alloc(99),
            Err(NerveError::UnknownPool(99))
        ));
    }
}
