//! Shared flat linear memory and typed access to it.
//!
//! ```text
//! SharedMemory = Arc<LinearMemory>   (one per region, shared by all agents)
//! ├── RawBuffer          reserved at max size, never moves (raw.rs)
//! ├── MemoryAccessor     TypeTag-dispatched read/write/fill/copy + atomics
//! └── HeapAllocator      first-fit coalescing malloc/free (RawAllocator)
//! ```
//!
//! This crate is the only one in the workspace that may contain `unsafe`
//! code, and only in `raw.rs`. Every access is bounds-checked against the
//! region, so addresses computed by guest code can at worst panic.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod accessor;
pub mod config;
pub mod error;
pub mod heap;
mod raw;
pub mod region;

pub use accessor::MemoryAccessor;
pub use config::{MemoryConfig, PAGE_SIZE};
pub use error::{AllocError, MemoryError};
pub use heap::{HeapAllocator, RawAllocator, HEAP_ALIGN};
pub use region::{LinearMemory, SharedMemory};
