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

//! A fixed-capacity slot table with high-water-mark bounded iteration.

use penumbra_core::error::SlotError;

/// A fixed-capacity table of slots, each free or owning exactly one `T`.
///
/// Allocation scans linearly for the lowest free slot, which is only done on
/// add/remove. Per-frame iteration is bounded by the highest occupied slot
/// (`max_index`), so a sparse table costs proportional to its high-water mark
/// rather than its capacity.
///
/// Consecutive runs ([`find_consecutive_slots`](Self::find_consecutive_slots))
/// let an owner address a group of resources as `first..first + n`, which is
/// how point lights keep their six cube faces contiguous on the GPU.
#[derive(Debug, Clone)]
pub struct SlotAllocator<T> {
    slots: Vec<Option<T>>,
    /// Highest occupied slot, `None` when empty.
    max_index: Option<usize>,
    num_entries: usize,
}

impl<T> SlotAllocator<T> {
    /// Creates an empty table of `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            max_index: None,
            num_entries: 0,
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.num_entries
    }

    /// Returns `true` if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Highest occupied slot, or `None` when the table is empty.
    pub fn max_index(&self) -> Option<usize> {
        self.max_index
    }

    /// One past the highest occupied slot: the number of entries a consumer
    /// must scan to see every occupied slot.
    pub fn index_bound(&self) -> usize {
        self.max_index.map_or(0, |max| max + 1)
    }

    /// Returns `true` if `slot` owns a value.
    pub fn is_occupied(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    /// Lowest free slot, or `None` if the table is full.
    pub fn find_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// First slot of the lowest run of `count` free consecutive slots.
    ///
    /// Returns `None` if no such run exists or `count` is zero.
    pub fn find_consecutive_slots(&self, count: usize) -> Option<usize> {
        if count == 0 || count > self.slots.len() {
            return None;
        }
        if count == 1 {
            return self.find_slot();
        }

        let mut run_start = 0;
        let mut run_len = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.is_some() {
                run_len = 0;
                run_start = index + 1;
                continue;
            }
            run_len += 1;
            if run_len == count {
                return Some(run_start);
            }
        }
        None
    }

    fn check_range(&self, slot: usize) -> Result<(), SlotError> {
        if slot >= self.slots.len() {
            return Err(SlotError::OutOfRange {
                slot,
                capacity: self.slots.len(),
            });
        }
        Ok(())
    }

    /// Stores `value` in the free slot `slot`.
    pub fn reserve_slot(&mut self, slot: usize, value: T) -> Result<(), SlotError> {
        self.check_range(slot)?;
        if self.slots[slot].is_some() {
            return Err(SlotError::Occupied(slot));
        }
        self.slots[slot] = Some(value);
        self.num_entries += 1;
        self.max_index = Some(self.max_index.map_or(slot, |max| max.max(slot)));
        Ok(())
    }

    /// Empties `slot`, returning the value it owned.
    ///
    /// Rescans downwards for the new high-water mark only when the vacated
    /// slot was the highest occupied one.
    pub fn free_slot(&mut self, slot: usize) -> Result<T, SlotError> {
        self.check_range(slot)?;
        let value = self.slots[slot].take().ok_or(SlotError::Vacant(slot))?;
        self.num_entries -= 1;

        if self.max_index == Some(slot) {
            self.max_index = self.slots[..slot].iter().rposition(Option::is_some);
        }
        Ok(value)
    }

    /// Frees every occupied slot in `first..first + count`, returning the values
    /// in slot order. Vacant slots in the run are skipped.
    pub fn free_consecutive_slots(&mut self, first: usize, count: usize) -> Vec<T> {
        (first..first + count)
            .filter_map(|slot| self.free_slot(slot).ok())
            .collect()
    }

    /// Returns the value in `slot`, if occupied.
    pub fn get(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Returns the value in `slot` mutably, if occupied.
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// Iterates occupied slots in increasing order, scanning only up to
    /// the high-water mark.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.slots[..self.index_bound()]
            .iter()
            .enumerate()
            .filter_map(|(slot, value)| value.as_ref().map(|v| (slot, v)))
    }

    /// Mutable counterpart of [`iter`](Self::iter).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> + '_ {
        let bound = self.index_bound();
        self.slots[..bound]
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, value)| value.as_mut().map(|v| (slot, v)))
    }
}
