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

//! Byte layout of a fast-event block.

use crate::error::{NerveError, NerveResult};

/// Fixed capacity, in bytes, of every header name slot.
pub const FAST_NAME_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotOffsets {
    pub(crate) name: usize,
    pub(crate) value: usize,
}

/// Describes where each header name, header value and the body live inside
/// one contiguous block.
///
/// Every block of a pool shares the same layout. Sizes are fixed when the
/// layout is built; a block is never resized afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastLayout {
    value_capacities: Vec<usize>,
    body_capacity: usize,
    offsets: Vec<SlotOffsets>,
    body_offset: usize,
    block_size: usize,
}

impl FastLayout {
    /// Computes the layout for `header_count` positional headers whose values
    /// hold at most `value_lengths[i]` bytes, followed by a body of at most
    /// `body_length` bytes.
    pub fn new(
        header_count: usize,
        value_lengths: &[usize],
        body_length: usize,
    ) -> NerveResult<Self> {
        if value_lengths.len() != header_count {
            return Err(NerveError::InvalidArgument(format!(
                "expected {header_count} value lengths, got {}",
                value_lengths.len()
            )));
        }

        let mut offsets = Vec::with_capacity(header_count);
        let mut cursor = 0usize;
        for &value_len in value_lengths {
            let name = cursor;
            let value = name + FAST_NAME_CAPACITY;
            offsets.push(SlotOffsets { name, value });
            cursor = value
                .checked_add(value_len)
                .ok_or_else(|| NerveError::InvalidArgument("header sizes overflow".into()))?;
        }
        let body_offset = cursor;
        let block_size = body_offset
            .checked_add(body_length)
            .ok_or_else(|| NerveError::InvalidArgument("body size overflows".into()))?;

        Ok(Self {
            value_capacities: value_lengths.to_vec(),
            body_capacity: body_length,
            offsets,
            body_offset,
            block_size,
        })
    }

    /// Number of positional header slots.
    pub fn header_count(&self) -> usize {
        self.offsets.len()
    }

    /// Maximum value length for slot `index`, if the slot exists.
    pub fn value_capacity(&self, index: usize) -> Option<usize> {
        self.value_capacities.get(index).copied()
    }

    /// Maximum body length.
    pub fn body_capacity(&self) -> usize {
        self.body_capacity
    }

    /// Total inline bytes of one block: every name and value buffer plus the body.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub(crate) fn slot(&self, index: usize) -> Option<SlotOffsets> {
        self.offsets.get(index).copied()
    }

    pub(crate) fn body_offset(&self) -> usize {
        self.body_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_covers_all_buffers() {
        let layout = FastLayout::new(2, &[8, 16], 64).unwrap();
        assert_eq!(layout.header_count(), 2);
        assert_eq!(
            layout.block_size(),
            2 * FAST_NAME_CAPACITY + 8 + 16 + 64
        );
        let second = layout.slot(1).unwrap();
        assert_eq!(second.name, FAST_NAME_CAPACITY + 8);
        assert_eq!(layout.body_offset(), 2 * FAST_NAME_CAPACITY + 24);
    }

    #[test]
    fn mismatched_value_lengths_are_rejected() {
        assert!(FastLayout::new(3, &[1, 2], 0).is_err());
    }

    #[test]
    fn headerless_layout_is_body_only() {
        let layout = FastLayout::new(0, &[], 128).unwrap();
        assert_eq!(layout.block_size(), 128);
        assert_eq!(layout.value_capacity(0), None);
    }
}
