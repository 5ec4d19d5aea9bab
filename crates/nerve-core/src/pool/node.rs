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

//! Pool-owned event storage with positional headers.

use super::layout::{FastLayout, FAST_NAME_CAPACITY};
use crate::error::{NerveError, NerveResult};
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
struct SlotLen {
    name: usize,
    value: usize,
}

/// The recyclable memory behind a [`FastNode`].
#[derive(Debug, Default)]
pub(crate) struct FastBlock {
    bytes: Box<[u8]>,
    slots: Box<[SlotLen]>,
    body_len: usize,
}

impl FastBlock {
    pub(crate) fn new(layout: &FastLayout) -> Self {
        Self {
            bytes: vec![0u8; layout.block_size()].into_boxed_slice(),
            slots: vec![SlotLen::default(); layout.header_count()].into_boxed_slice(),
            body_len: 0,
        }
    }

    fn reset(&mut self) {
        self.slots.fill(SlotLen::default());
        self.body_len = 0;
    }
}

/// An event storage block borrowed from a [`FastPool`](super::FastPool).
///
/// Headers are addressed by position: slot `i` can hold one name of up to
/// [`FAST_NAME_CAPACITY`] bytes and one value of up to the layout's
/// `value_capacity(i)` bytes. Writes copy into the preallocated block and
/// never allocate.
///
/// Dropping the node hands its block back to the pool it came from, so each
/// allocation is released exactly once.
pub struct FastNode {
    tag: u32,
    layout: Arc<FastLayout>,
    block: FastBlock,
    home: flume::Sender<FastBlock>,
}

impl FastNode {
    pub(crate) fn new(
        tag: u32,
        layout: Arc<FastLayout>,
        block: FastBlock,
        home: flume::Sender<FastBlock>,
    ) -> Self {
        Self {
            tag,
            layout,
            block,
            home,
        }
    }

    /// Tag of the pool this node belongs to.
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Layout shared by every node of the pool.
    pub fn layout(&self) -> &FastLayout {
        &self.layout
    }

    /// Writes a string header into slot `index`.
    pub fn set_strheader(&mut self, index: usize, name: &str, value: &str) -> NerveResult<()> {
        self.store(index, name, value.as_bytes())
    }

    /// Writes a signed integer header, formatted in decimal, into slot `index`.
    pub fn set_intheader(&mut self, index: usize, name: &str, value: i64) -> NerveResult<()> {
        let mut scratch = [0u8; INT_SCRATCH];
        let len = format_into(&mut scratch, format_args!("{value}"));
        self.store(index, name, &scratch[..len])
    }

    /// Writes an unsigned integer header, formatted in decimal, into slot `index`.
    pub fn set_uintheader(&mut self, index: usize, name: &str, value: u64) -> NerveResult<()> {
        let mut scratch = [0u8; INT_SCRATCH];
        let len = format_into(&mut scratch, format_args!("{value}"));
        self.store(index, name, &scratch[..len])
    }

    /// Empties slot `index`.
    pub fn clear_header(&mut self, index: usize) -> NerveResult<()> {
        let slot = self
            .block
            .slots
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, self.layout.header_count()))?;
        *slot = SlotLen::default();
        Ok(())
    }

    /// Returns the `(name, value)` stored in slot `index`, if the slot is set.
    pub fn header_at(&self, index: usize) -> Option<(&str, &str)> {
        let len = self.block.slots.get(index)?;
        if len.name == 0 {
            return None;
        }
        let offsets = self.layout.slot(index)?;
        let name = std::str::from_utf8(&self.block.bytes[offsets.name..offsets.name + len.name]);
        let value =
            std::str::from_utf8(&self.block.bytes[offsets.value..offsets.value + len.value]);
        Some((name.ok()?, value.ok()?))
    }

    /// Looks up a header value by name (ASCII case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Index of the set slot named `name` (ASCII case-insensitive).
    pub fn position(&self, name: &str) -> Option<usize> {
        (0..self.layout.header_count()).find(|&i| {
            self.header_at(i)
                .is_some_and(|(n, _)| n.eq_ignore_ascii_case(name))
        })
    }

    /// Replaces the value of the set slot `index`, keeping its name.
    pub fn set_value(&mut self, index: usize, value: &str) -> NerveResult<()> {
        let offsets = self
            .layout
            .slot(index)
            .ok_or_else(|| out_of_range(index, self.layout.header_count()))?;
        let cap = self.layout.value_capacity(index).unwrap_or(0);
        if self.block.slots[index].name == 0 {
            return Err(NerveError::InvalidArgument(format!(
                "header slot {index} is empty"
            )));
        }
        if value.len() > cap {
            return Err(NerveError::CapacityExceeded(format!(
                "value of {} bytes does not fit slot {index} ({cap} bytes)",
                value.len()
            )));
        }
        self.block.bytes[offsets.value..offsets.value + value.len()]
            .copy_from_slice(value.as_bytes());
        self.block.slots[index].value = value.len();
        Ok(())
    }

    /// Iterates over the set slots in positional order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        (0..self.layout.header_count()).filter_map(move |i| self.header_at(i))
    }

    /// Replaces the inline body.
    pub fn set_body(&mut self, body: &str) -> NerveResult<()> {
        let cap = self.layout.body_capacity();
        if body.len() > cap {
            return Err(NerveError::CapacityExceeded(format!(
                "body of {} bytes exceeds the {cap}-byte body buffer",
                body.len()
            )));
        }
        let off = self.layout.body_offset();
        self.block.bytes[off..off + body.len()].copy_from_slice(body.as_bytes());
        self.block.body_len = body.len();
        Ok(())
    }

    /// Returns the inline body, or `None` when it is empty.
    pub fn body(&self) -> Option<&str> {
        if self.block.body_len == 0 {
            return None;
        }
        let off = self.layout.body_offset();
        std::str::from_utf8(&self.block.bytes[off..off + self.block.body_len]).ok()
    }

    /// Clears every slot and the body without touching the backing bytes.
    pub fn reset(&mut self) {
        self.block.reset();
    }

    /// Validates everything first so a rejected write leaves the slot intact.
    /// A name may occupy only one slot.
    fn store(&mut self, index: usize, name: &str, value: &[u8]) -> NerveResult<()> {
        let count = self.layout.header_count();
        let (offsets, cap) = match (self.layout.slot(index), self.layout.value_capacity(index)) {
            (Some(offsets), Some(cap)) => (offsets, cap),
            _ => return Err(out_of_range(index, count)),
        };
        if name.is_empty() || name.len() > FAST_NAME_CAPACITY {
            return Err(NerveError::InvalidArgument(format!(
                "header name must be 1..={FAST_NAME_CAPACITY} bytes, got {}",
                name.len()
            )));
        }
        if let Some(other) = self.position(name).filter(|&i| i != index) {
            return Err(NerveError::Declined(format!(
                "header '{name}' already occupies slot {other}"
            )));
        }
        if value.len() > cap {
            return Err(NerveError::CapacityExceeded(format!(
                "value of {} bytes does not fit slot {index} ({cap} bytes)",
                value.len()
            )));
        }

        let bytes = &mut self.block.bytes;
        bytes[offsets.name..offsets.name + name.len()].copy_from_slice(name.as_bytes());
        bytes[offsets.value..offsets.value + value.len()].copy_from_slice(value);
        self.block.slots[index] = SlotLen {
            name: name.len(),
            value: value.len(),
        };
        Ok(())
    }
}

/// Large enough for any `i64` or `u64` in decimal.
const INT_SCRATCH: usize = 24;

fn format_into(buf: &mut [u8; INT_SCRATCH], args: std::fmt::Arguments<'_>) -> usize {
    let total = buf.len();
    let mut cursor: &mut [u8] = buf;
    // Cannot overflow: 20 digits plus a sign is the longest integer rendering.
    let _ = cursor.write_fmt(args);
    total - cursor.len()
}

fn out_of_range(index: usize, count: usize) -> NerveError {
    NerveError::InvalidArgument(format!(
        "header slot {index} out of range (layout has {count})"
    ))
}

impl Drop for FastNode {
    fn drop(&mut self) {
        let mut block = std::mem::take(&mut self.block);
        block.reset();
        // The receiver is gone once the pool itself has been dropped; the
        // block is then simply freed.
        if self.home.try_send(block).is_err() {
            log::trace!("Fast pool {} is gone, freeing block.", self.tag);
        }
    }
}

impl std::fmt::Debug for FastNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastNode")
            .field("tag", &self.tag)
            .field("headers", &self.headers().collect::<Vec<_>>())
            .field("body", &self.body())
            .finish()
    }
}
