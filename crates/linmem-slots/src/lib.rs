//! Contiguous index allocation over growable slot tables.
//!
//! ```text
//! SlotAllocator<T: SlotTable>
//! ├── [0, reserved)          built-in entries, never handed out
//! └── [reserved, capacity)   ordered SlotNode list, first-fit + coalescing
//! ```
//!
//! The allocator owns its table and is single-threaded (`&mut self`); an
//! agent that shares a table with others must serialise access itself.
//! [`HandleTable`] layers one-entry-per-index storage on top.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod handles;
pub mod table;

pub use allocator::{InvariantViolation, SlotAllocator, SlotNode};
pub use config::SlotConfig;
pub use error::SlotConfigError;
pub use handles::HandleTable;
pub use table::{SlotTable, VecSlotTable};
