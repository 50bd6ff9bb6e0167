//! Slot allocator error types.

use std::error::Error;
use std::fmt;

/// A [`SlotConfig`](crate::SlotConfig) that does not fit its table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotConfigError {
    /// The reserved range is longer than the table.
    ReservedBeyondTable {
        /// Reserved slots requested.
        reserved: u32,
        /// Slots in the table.
        len: u32,
    },
}

impl fmt::Display for SlotConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedBeyondTable { reserved, len } => write!(
                f,
                "{reserved} reserved slots do not fit a table of {len} slots"
            ),
        }
    }
}

impl Error for SlotConfigError {}
