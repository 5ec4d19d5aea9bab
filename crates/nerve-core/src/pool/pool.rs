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

use super::layout::FastLayout;
use super::node::{FastBlock, FastNode};
use crate::error::{NerveError, NerveResult};
use std::sync::Arc;

/// A fixed-capacity free list of pre-sized event blocks.
///
/// Every block is allocated up front by [`FastPool::new`]; afterwards
/// [`alloc`](FastPool::alloc) and [`release`](FastPool::release) only move
/// blocks in and out of a bounded queue, so steady-state use performs no heap
/// allocation. The pool never grows: once every block is out, `alloc` fails.
#[derive(Debug)]
pub struct FastPool {
    tag: u32,
    capacity: usize,
    layout: Arc<FastLayout>,
    free_tx: flume::Sender<FastBlock>,
    free_rx: flume::Receiver<FastBlock>,
}

impl FastPool {
    /// Builds a pool of `capacity` blocks for events tagged `tag`.
    pub fn new(
        tag: u32,
        capacity: usize,
        header_count: usize,
        value_lengths: &[usize],
        body_length: usize,
    ) -> NerveResult<Self> {
        if capacity == 0 {
            return Err(NerveError::InvalidArgument(
                "fast pool capacity must be non-zero".into(),
            ));
        }
        let layout = Arc::new(FastLayout::new(header_count, value_lengths, body_length)?);

        let mut blocks = Vec::new();
        blocks.try_reserve_exact(capacity).map_err(|e| {
            NerveError::Memory(format!("cannot reserve {capacity} fast blocks: {e}"))
        })?;
        blocks.extend((0..capacity).map(|_| FastBlock::new(&layout)));

        let (free_tx, free_rx) = flume::bounded(capacity);
        for block in blocks {
            free_tx
                .try_send(block)
                .map_err(|_| NerveError::CapacityExceeded("fast pool free list".into()))?;
        }

        log::debug!(
            "Fast pool {tag} ready: {capacity} blocks of {} bytes.",
            layout.block_size()
        );

        Ok(Self {
            tag,
            capacity,
            layout,
            free_tx,
            free_rx,
        })
    }

    /// Takes one block from the free list.
    ///
    /// Fails with [`NerveError::CapacityExceeded`] when every block is in use.
    pub fn alloc(&self) -> NerveResult<FastNode> {
        match self.free_rx.try_recv() {
            Ok(block) => Ok(FastNode::new(
                self.tag,
                Arc::clone(&self.layout),
                block,
                self.free_tx.clone(),
            )),
            Err(_) => {
                log::warn!(
                    "Fast pool {} exhausted ({} blocks in use).",
                    self.tag,
                    self.capacity
                );
                Err(NerveError::CapacityExceeded(format!(
                    "fast pool {} has no free block",
                    self.tag
                )))
            }
        }
    }

    /// Returns a node's block to the free list.
    ///
    /// Equivalent to dropping the node; taking it by value makes a second
    /// release of the same allocation impossible.
    pub fn release(&self, node: FastNode) -> NerveResult<()> {
        if node.tag() != self.tag {
            let tag = node.tag();
            // The node still goes home to its own pool when dropped.
            drop(node);
            return Err(NerveError::InvalidArgument(format!(
                "node of pool {tag} released into pool {}",
                self.tag
            )));
        }
        drop(node);
        Ok(())
    }

    /// The type tag this pool serves.
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Total number of blocks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks currently in the free list.
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    /// Number of blocks currently handed out.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// The block layout shared by all nodes.
    pub fn layout(&self) -> &FastLayout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    #[test]
    fn alloc_is_bounded_by_capacity() {
        let pool = FastPool::new(1, 2, 1, &[8], 16).unwrap();
        let a = pool.alloc().unwrap();
        let _b = pool.alloc().unwrap();
        assert_eq!(pool.in_use(), 2);

        let err = pool.alloc().unwrap_err();
        assert_eq!(err.status(), Status::GenErr);

        pool.release(a).unwrap();
        assert_eq!(pool.available(), 1);
        assert!(pool.alloc().is_ok());
    }

    #[test]
    fn released_nodes_come_back_empty() {
        let pool = FastPool::new(3, 1, 1, &[8], 8).unwrap();
        let mut node = pool.alloc().unwrap();
        node.set_strheader(0, "k", "v").unwrap();
        node.set_body("b").unwrap();
        pool.release(node).unwrap();

        let node = pool.alloc().unwrap();
        assert_eq!(node.headers().count(), 0);
        assert_eq!(node.body(), None);
    }

    #[test]
    fn foreign_release_is_rejected_but_not_lost() {
        let first = FastPool::new(1, 1, 0, &[], 4).unwrap();
        let second = FastPool::new(2, 1, 0, &[], 4).unwrap();
        let node = first.alloc().unwrap();

        assert!(second.release(node).is_err());
        assert_eq!(first.available(), 1);
        assert_eq!(second.available(), 1);
    }

    #[test]
    fn zero_capacity_is_invalid() {
        assert!(FastPool::new(1, 0, 0, &[], 0).is_err());
    }
}
