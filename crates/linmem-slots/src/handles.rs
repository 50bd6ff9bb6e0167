//! One-slot-per-entry handle table over a [`SlotAllocator`].

use crate::allocator::SlotAllocator;
use crate::config::SlotConfig;
use crate::error::SlotConfigError;
use crate::table::{SlotTable, VecSlotTable};

/// Maps `u32` indices to owned handles, reusing freed indices first-fit.
///
/// Indices below the configured reserved count belong to pre-populated
/// entries and are never returned by [`insert`](Self::insert) or released by
/// [`remove`](Self::remove).
pub struct HandleTable<H> {
    slots: SlotAllocator<VecSlotTable<H>>,
}

impl<H> HandleTable<H> {
    /// An empty table with no reserved entries.
    pub fn new() -> Self {
        Self {
            slots: SlotAllocator::new(VecSlotTable::default(), SlotConfig::default())
                .expect("zero reserved slots always fit"),
        }
    }

    /// A table whose low indices hold `reserved`, with `spare` empty slots
    /// above them.
    pub fn with_reserved(
        reserved: Vec<H>,
        spare: u32,
        rebuild_on_empty: bool,
    ) -> Result<Self, SlotConfigError> {
        let count = reserved.len() as u32;
        let table = VecSlotTable::with_reserved(reserved, spare);
        let config = SlotConfig::new(count).with_rebuild_on_empty(rebuild_on_empty);
        Ok(Self {
            slots: SlotAllocator::new(table, config)?,
        })
    }

    /// Store `handle` in the lowest free slot and return its index.
    pub fn insert(&mut self, handle: H) -> u32 {
        let index = self.slots.alloc(1);
        self.slots.table_mut().set(index, Some(handle));
        index
    }

    /// The handle at `index`, reserved entries included.
    pub fn get(&self, index: u32) -> Option<&H> {
        self.slots.table().get(index)
    }

    /// Swap the handle at a live or reserved `index`, returning the old one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is neither reserved nor live.
    pub fn replace(&mut self, index: u32, handle: H) -> Option<H> {
        assert!(
            index < self.slots.first_usable() || self.slots.is_allocated(index),
            "slot {index} is not live"
        );
        self.slots.table_mut().set(index, Some(handle))
    }

    /// Take the handle at `index` and release the slot.
    ///
    /// Returns `None`, changing nothing, if `index` is reserved or not live.
    pub fn remove(&mut self, index: u32) -> Option<H> {
        if index < self.slots.first_usable() || !self.slots.is_allocated(index) {
            return None;
        }
        let handle = self.slots.table_mut().set(index, None);
        self.slots.free(index);
        handle
    }

    /// Number of live (non-reserved) entries.
    pub fn len(&self) -> u32 {
        self.slots.occupied()
    }

    /// Whether there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots in the underlying table, reserved ones included.
    pub fn capacity(&self) -> u32 {
        self.slots.capacity()
    }
}

impl<H> Default for HandleTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
