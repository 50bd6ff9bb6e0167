//! Core types for typed access to flat linear memory.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental vocabulary used throughout the linmem workspace:
//! addresses, scalar type tags, scalar values, composite type layouts,
//! field paths, and the layout error type.
//!
//! Nothing in this crate touches memory. Layout metadata is pure data:
//! a [`TypeDescriptor`] says *where* a field lives and *how* it is stored,
//! and the accessor/view crates turn that into loads and stores.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod address;
pub mod error;
pub mod layout;
pub mod path;
pub mod registry;
pub mod tag;
pub mod value;

pub use address::{Address, AddressWidth};
pub use error::LayoutError;
pub use layout::{
    BitField, DescriptorBuilder, DescriptorKind, FieldKind, FieldLayout, FieldSpec,
    TypeDescriptor,
};
pub use path::{DynamicIndex, FieldPath, PathSegment, ResolvedField, Terminal};
pub use registry::{global_registry, DescriptorRegistry};
pub use tag::TypeTag;
pub use value::Value;
