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

//! # Timer Tree
//!
//! A red-black tree stored in a slot arena. Nodes refer to each other by
//! index; index `0` is a shared black sentinel standing in for every leaf,
//! so the rebalancing code never has to special-case missing children.
//!
//! Keys are millisecond deadlines truncated to `u32`. They are ordered with
//! [`key_before`], which stays correct across the wrap of the key space as
//! long as every live key lies within ~24.8 days of every other one.

const SENTINEL: usize = 0;

/// Returns `true` if deadline `a` comes strictly before deadline `b`.
///
/// Compares through the signed difference, so `u32::MAX` is before `0`.
#[inline]
pub fn key_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug)]
struct TreeNode<T> {
    key: u32,
    parent: usize,
    left: usize,
    right: usize,
    color: Color,
    generation: u32,
    value: Option<T>,
}

impl<T> TreeNode<T> {
    fn vacant() -> Self {
        Self {
            key: 0,
            parent: SENTINEL,
            left: SENTINEL,
            right: SENTINEL,
            color: Color::Black,
            generation: 0,
            value: None,
        }
    }
}

/// Handle to one entry of a [`TimerTree`].
///
/// Handles carry a generation, so a handle to a removed entry never matches
/// a later entry that reuses the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerSlot {
    index: usize,
    generation: u32,
}

/// A deadline-ordered red-black tree.
///
/// Equal keys are kept in insertion order. Insert, remove and
/// [`pop_expired`](Self::pop_expired) are `O(log n)`; removed slots are
/// recycled through a free list.
#[derive(Debug)]
pub struct TimerTree<T> {
    nodes: Vec<TreeNode<T>>,
    root: usize,
    free_list: Vec<usize>,
    len: usize,
}

impl<T> Default for TimerTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerTree<T> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode::vacant()],
            root: SENTINEL,
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `value` under deadline `key`.
    pub fn insert(&mut self, key: u32, value: T) -> TimerSlot {
        let z = self.allocate_node(key, value);

        let mut parent = SENTINEL;
        let mut cursor = self.root;
        while cursor != SENTINEL {
            parent = cursor;
            cursor = if key_before(key, self.nodes[cursor].key) {
                self.nodes[cursor].left
            } else {
                self.nodes[cursor].right
            };
        }

        self.nodes[z].parent = parent;
        if parent == SENTINEL {
            self.root = z;
        } else if key_before(key, self.nodes[parent].key) {
            self.nodes[parent].left = z;
        } else {
            self.nodes[parent].right = z;
        }

        self.insert_fixup(z);
        self.len += 1;
        TimerSlot {
            index: z,
            generation: self.nodes[z].generation,
        }
    }

    /// Removes the entry behind `slot`, returning its key and value.
    ///
    /// Returns `None` if the entry was already removed.
    pub fn remove(&mut self, slot: TimerSlot) -> Option<(u32, T)> {
        if !self.is_live(slot) {
            return None;
        }
        self.delete(slot.index);
        self.len -= 1;
        let node = &mut self.nodes[slot.index];
        let key = node.key;
        let value = node.value.take();
        self.deallocate_node(slot.index);
        value.map(|v| (key, v))
    }

    /// The earliest entry, without removing it.
    pub fn min(&self) -> Option<(TimerSlot, u32)> {
        if self.root == SENTINEL {
            return None;
        }
        let index = self.minimum(self.root);
        let node = &self.nodes[index];
        Some((
            TimerSlot {
                index,
                generation: node.generation,
            },
            node.key,
        ))
    }

    /// Removes and returns the earliest entry if its deadline is not after `now`.
    pub fn pop_expired(&mut self, now: u32) -> Option<(u32, T)> {
        let (slot, key) = self.min()?;
        if key_before(now, key) {
            return None;
        }
        self.remove(slot)
    }

    /// The deadline of a live entry.
    pub fn key(&self, slot: TimerSlot) -> Option<u32> {
        self.is_live(slot).then(|| self.nodes[slot.index].key)
    }

    /// The value of a live entry.
    pub fn get(&self, slot: TimerSlot) -> Option<&T> {
        if !self.is_live(slot) {
            return None;
        }
        self.nodes[slot.index].value.as_ref()
    }

    /// Mutable access to the value of a live entry.
    pub fn get_mut(&mut self, slot: TimerSlot) -> Option<&mut T> {
        if !self.is_live(slot) {
            return None;
        }
        self.nodes[slot.index].value.as_mut()
    }

    /// Removes every entry and returns the values in deadline order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);
        while let Some((slot, _)) = self.min() {
            if let Some((_, value)) = self.remove(slot) {
                values.push(value);
            }
        }
        values
    }

    fn is_live(&self, slot: TimerSlot) -> bool {
        slot.index != SENTINEL
            && self
                .nodes
                .get(slot.index)
                .is_some_and(|n| n.generation == slot.generation && n.value.is_some())
    }

    fn allocate_node(&mut self, key: u32, value: T) -> usize {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.nodes.push(TreeNode::vacant());
                self.nodes.len() - 1
            }
        };
        let node = &mut self.nodes[index];
        node.key = key;
        node.parent = SENTINEL;
        node.left = SENTINEL;
        node.right = SENTINEL;
        node.color = Color::Red;
        node.value = Some(value);
        index
    }

    fn deallocate_node(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        node.generation = node.generation.wrapping_add(1);
        node.parent = SENTINEL;
        node.left = SENTINEL;
        node.right = SENTINEL;
        node.color = Color::Black;
        self.free_list.push(index);
    }

    fn minimum(&self, mut index: usize) -> usize {
        while self.nodes[index].left != SENTINEL {
            index = self.nodes[index].left;
        }
        index
    }

    #[inline]
    fn is_red(&self, index: usize) -> bool {
        self.nodes[index].color == Color::Red
    }

    fn rotate_left(&mut self, x: usize) {
        let y = self.nodes[x].right;
        debug_assert!(y != SENTINEL);

        let y_left = self.nodes[y].left;
        self.nodes[x].right = y_left;
        if y_left != SENTINEL {
            self.nodes[y_left].parent = x;
        }

        let parent = self.nodes[x].parent;
        self.nodes[y].parent = parent;
        if parent == SENTINEL {
            self.root = y;
        } else if x == self.nodes[parent].left {
            self.nodes[parent].left = y;
        } else {
            self.nodes[parent].right = y;
        }

        self.nodes[y].left = x;
        self.nodes[x].parent = y;
    }

    fn rotate_right(&mut self, x: usize) {
        let y = self.nodes[x].left;
        debug_assert!(y != SENTINEL);

        let y_right = self.nodes[y].right;
        self.nodes[x].left = y_right;
        if y_right != SENTINEL {
            self.nodes[y_right].parent = x;
        }

        let parent = self.nodes[x].parent;
        self.nodes[y].parent = parent;
        if parent == SENTINEL {
            self.root = y;
        } else if x == self.nodes[parent].right {
            self.nodes[parent].right = y;
        } else {
            self.nodes[parent].left = y;
        }

        self.nodes[y].right = x;
        self.nodes[x].parent = y;
    }

    fn insert_fixup(&mut self, mut z: usize) {
        while self.is_red(self.nodes[z].parent) {
            let parent = self.nodes[z].parent;
            let grand = self.nodes[parent].parent;

            if parent == self.nodes[grand].left {
                let uncle = self.nodes[grand].right;
                if self.is_red(uncle) {
                    self.nodes[parent].color = Color::Black;
                    self.nodes[uncle].color = Color::Black;
                    self.nodes[grand].color = Color::Red;
                    z = grand;
                    continue;
                }
                if z == self.nodes[parent].right {
                    z = parent;
                    self.rotate_left(z);
                }
                let parent = self.nodes[z].parent;
                let grand = self.nodes[parent].parent;
                self.nodes[parent].color = Color::Black;
                self.nodes[grand].color = Color::Red;
                self.rotate_right(grand);
            } else {
                let uncle = self.nodes[grand].left;
                if self.is_red(uncle) {
                    self.nodes[parent].color = Color::Black;
                    self.nodes[uncle].color = Color::Black;
                    self.nodes[grand].color = Color::Red;
                    z = grand;
                    continue;
                }
                if z == self.nodes[parent].left {
                    z = parent;
                    self.rotate_right(z);
                }
                let parent = self.nodes[z].parent;
                let grand = self.nodes[parent].parent;
                self.nodes[parent].color = Color::Black;
                self.nodes[grand].color = Color::Red;
                self.rotate_left(grand);
            }
        }
        let root = self.root;
        self.nodes[root].color = Color::Black;
    }

    /// Puts `v` where `u` was. Writes the sentinel's parent when `v` is the
    /// sentinel; the delete fixup reads it back.
    fn transplant(&mut self, u: usize, v: usize) {
        let parent = self.nodes[u].parent;
        if parent == SENTINEL {
            self.root = v;
        } else if u == self.nodes[parent].left {
            self.nodes[parent].left = v;
        } else {
            self.nodes[parent].right = v;
        }
        self.nodes[v].parent = parent;
    }

    fn delete(&mut self, z: usize) {
        let mut removed_color = self.nodes[z].color;
        let x;

        if self.nodes[z].left == SENTINEL {
            x = self.nodes[z].right;
            self.transplant(z, x);
        } else if self.nodes[z].right == SENTINEL {
            x = self.nodes[z].left;
            self.transplant(z, x);
        } else {
            let y = self.minimum(self.nodes[z].right);
            removed_color = self.nodes[y].color;
            x = self.nodes[y].right;

            if self.nodes[y].parent == z {
                self.nodes[x].parent = y;
            } else {
                self.transplant(y, x);
                let z_right = self.nodes[z].right;
                self.nodes[y].right = z_right;
                self.nodes[z_right].parent = y;
            }

            self.transplant(z, y);
            let z_left = self.nodes[z].left;
            self.nodes[y].left = z_left;
            self.nodes[z_left].parent = y;
            self.nodes[y].color = self.nodes[z].color;
        }

        if removed_color == Color::Black {
            self.delete_fixup(x);
        }

        // The sentinel must look like an untouched black leaf again.
        let sentinel = &mut self.nodes[SENTINEL];
        sentinel.parent = SENTINEL;
        sentinel.color = Color::Black;
    }

    fn delete_fixup(&mut self, mut x: usize) {
        while x != self.root && !self.is_red(x) {
            let parent = self.nodes[x].parent;

            if x == self.nodes[parent].left {
                let mut w = self.nodes[parent].right;
                if self.is_red(w) {
                    self.nodes[w].color = Color::Black;
                    self.nodes[parent].color = Color::Red;
                    self.rotate_left(parent);
                    w = self.nodes[parent].right;
                }
                if !self.is_red(self.nodes[w].left) && !self.is_red(self.nodes[w].right) {
                    self.nodes[w].color = Color::Red;
                    x = parent;
                } else {
                    if !self.is_red(self.nodes[w].right) {
                        let w_left = self.nodes[w].left;
                        self.nodes[w_left].color = Color::Black;
                        self.nodes[w].color = Color::Red;
                        self.rotate_right(w);
                        w = self.nodes[parent].right;
                    }
                    self.nodes[w].color = self.nodes[parent].color;
                    self.nodes[parent].color = Color::Black;
                    let w_right = self.nodes[w].right;
                    self.nodes[w_right].color = Color::Black;
                    self.rotate_left(parent);
                    x = self.root;
                }
            } else {
                let mut w = self.nodes[parent].left;
                if self.is_red(w) {
                    self.nodes[w].color = Color::Black;
                    self.nodes[parent].color = Color::Red;
                    self.rotate_right(parent);
                    w = self.nodes[parent].left;
                }
                if !self.is_red(self.nodes[w].right) && !self.is_red(self.nodes[w].left) {
                    self.nodes[w].color = Color::Red;
                    x = parent;
                } else {
                    if !self.is_red(self.nodes[w].left) {
                        let w_right = self.nodes[w].right;
                        self.nodes[w_right].color = Color::Black;
                        self.nodes[w].color = Color::Red;
                        self.rotate_left(w);
                        w = self.nodes[parent].left;
                    }
                    self.nodes[w].color = self.nodes[parent].color;
                    self.nodes[parent].color = Color::Black;
                    let w_left = self.nodes[w].left;
                    self.nodes[w_left].color = Color::Black;
                    self.rotate_right(parent);
                    x = self.root;
                }
            }
        }
        self.nodes[x].color = Color::Black;
    }

    /// Walks the whole tree and returns its black height, panicking on any
    /// broken red-black or ordering property.
    #[cfg(test)]
    fn check_invariants(&self) -> usize {
        assert!(!self.is_red(SENTINEL), "sentinel turned red");
        assert!(!self.is_red(self.root), "root must be black");
        let mut count = 0;
        let height = self.check_subtree(self.root, &mut count);
        assert_eq!(count, self.len, "reachable nodes differ from len");
        height
    }

    #[cfg(test)]
    fn check_subtree(&self, index: usize, count: &mut usize) -> usize {
        if index == SENTINEL {
            return 1;
        }
        *count += 1;
        let node = &self.nodes[index];
        for child in [node.left, node.right] {
            if child != SENTINEL {
                assert_eq!(self.nodes[child].parent, index, "broken parent link");
                if node.color == Color::Red {
                    assert!(!self.is_red(child), "red node with red child");
                }
            }
        }
        if node.left != SENTINEL {
            assert!(!key_before(node.key, self.nodes[node.left].key));
        }
        if node.right != SENTINEL {
            assert!(!key_before(self.nodes[node.right].key, node.key));
        }
        let left = self.check_subtree(node.left, count);
        let right = self.check_subtree(node.right, count);
        assert_eq!(left, right, "unequal black heights");
        left + usize::from(node.color == Color::Black)
    }
}
