//! linmem: typed access to flat, shared linear memory.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all linmem sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use linmem::prelude::*;
//! use std::sync::Arc;
//!
//! let desc = DescriptorBuilder::new("Point", AddressWidth::W32)
//!     .scalar("x", TypeTag::I32)
//!     .scalar("y", TypeTag::I32)
//!     .bit_field("visible", TypeTag::U8, 1)
//!     .build()
//!     .unwrap();
//!
//! let memory = LinearMemory::shared(MemoryConfig::new(AddressWidth::W32)).unwrap();
//! let heap = Arc::new(HeapAllocator::new(Arc::clone(&memory)));
//! let agent = Agent::new(memory, heap);
//!
//! let p = agent.make_struct(&desc, None).unwrap();
//! let point: StructView = p.view(&desc);
//! point.set("x", -3i32);
//! point.set("visible", 1u8);
//! assert_eq!(point.value("x"), Value::Signed(-3));
//!
//! let q = p.clone();
//! assert_eq!(q.use_count(), 2);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `linmem-core` | Addresses, tags, values, descriptors, field paths |
//! | [`memory`] | `linmem-memory` | Regions, the accessor, the raw heap |
//! | [`view`] | `linmem-view` | Struct and array views, access strategies |
//! | [`slots`] | `linmem-slots` | Slot tables and the first-fit slot allocator |
//! | [`shared`] | `linmem-shared` | Agents, shared pointers, transfers |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core vocabulary (`linmem-core`).
pub use linmem_core as types;

/// Linear memory regions and raw access (`linmem-memory`).
pub use linmem_memory as memory;

/// Typed views (`linmem-view`).
pub use linmem_view as view;

/// Slot allocation (`linmem-slots`).
pub use linmem_slots as slots;

/// Shared pointers (`linmem-shared`).
pub use linmem_shared as shared;

/// Common imports for typical linmem usage.
pub mod prelude {
    // Core
    pub use linmem_core::{
        Address, AddressWidth, DescriptorBuilder, FieldPath, FieldSpec, TypeDescriptor, TypeTag,
        Value,
    };

    // Memory
    pub use linmem_memory::{
        HeapAllocator, LinearMemory, MemoryAccessor, MemoryConfig, RawAllocator,
    };

    // Views
    pub use linmem_view::{ArrayView, FieldInput, FieldValue, StructView};

    // Slots
    pub use linmem_slots::{HandleTable, SlotAllocator, SlotConfig, SlotTable, VecSlotTable};

    // Shared pointers
    pub use linmem_shared::{Agent, Destructor, SharedPtr, Transferable};

    // Errors
    pub use linmem_core::LayoutError;
    pub use linmem_memory::{AllocError, MemoryError};
    pub use linmem_shared::ShareError;
    pub use linmem_slots::SlotConfigError;
}
