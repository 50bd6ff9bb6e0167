//! Typed views over structs, unions, and arrays in linear memory.
//!
//! A [`StructView`] pairs an address with a
//! [`TypeDescriptor`](linmem_core::TypeDescriptor) and exposes field
//! get/set routed through a [`MemoryAccessor`](linmem_memory::MemoryAccessor).
//! Nested composites and arrays are child views that track their parent's
//! current address.
//!
//! # Strategies
//!
//! [`Eager`] installs one accessor per field (and builds nested child
//! views) at construction; [`OnDemand`] resolves each access from the
//! descriptor. Both satisfy one contract. `StructView` without a type
//! argument uses [`DefaultStrategy`], which the `eager` cargo feature
//! switches to [`Eager`].
//!
//! # Checks
//!
//! Array-index bounds, detach state, and null dereference are asserted
//! in debug builds and when the `checked` feature is on; otherwise they are
//! skipped. Region bounds are always enforced by the accessor, so an
//! unchecked bad access still cannot reach outside the region.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod anchor;
pub mod array;
mod scalar;
pub mod strategy;
pub mod value;
pub mod view;

pub use anchor::DetachHandle;
pub use array::ArrayView;
pub use linmem_memory::AllocError;
pub use strategy::{AccessKind, DefaultStrategy, Eager, FieldAccessor, OnDemand, ViewStrategy};
pub use value::{CopySource, FieldInput, FieldValue};
pub use view::StructView;

/// Whether view-level checks are compiled in.
pub const CHECKED: bool = cfg!(any(debug_assertions, feature = "checked"));
