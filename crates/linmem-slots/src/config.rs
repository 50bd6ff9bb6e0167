//! Slot allocator configuration.

use crate::error::SlotConfigError;

/// Configuration for a [`SlotAllocator`](crate::SlotAllocator).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotConfig {
    /// Built-in slots at the bottom of the table, never handed out.
    ///
    /// Default: 0. These map one-to-one onto entries an external tool
    /// placed in the table before the allocator took over.
    pub reserved: u32,

    /// Discard and rebuild the table when the last allocation is freed,
    /// keeping only the reserved entries.
    ///
    /// Default: `false`.
    pub rebuild_on_empty: bool,
}

impl SlotConfig {
    /// A config with `reserved` built-in slots and no rebuild.
    pub fn new(reserved: u32) -> Self {
        Self {
            reserved,
            rebuild_on_empty: false,
        }
    }

    /// Same config with rebuild-on-empty switched on or off.
    pub fn with_rebuild_on_empty(mut self, enabled: bool) -> Self {
        self.rebuild_on_empty = enabled;
        self
    }

    /// Check the config against a table of `len` slots.
    pub fn validate(&self, len: u32) -> Result<(), SlotConfigError> {
        if self.reserved > len {
            return Err(SlotConfigError::ReservedBeyondTable {
                reserved: self.reserved,
                len,
            });
        }
        Ok(())
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self::new(0)
    }
}
