//! Atomically reference-counted pointers into shared linear memory.
//!
//! ```text
//! Agent (one per thread, !Send)
//! ├── MemoryAccessor            shared region
//! ├── Arc<dyn RawAllocator>     shared malloc/free
//! └── DestructorRegistry        local: block → (destructor, local handles)
//!
//! SharedPtr ──► control block (16 bytes in linear memory)
//!               ├── u32 strong count   (atomic, all agents)
//!               └── payload address
//! ```
//!
//! A [`SharedPtr`] never crosses threads itself. To hand a share to another
//! agent, call [`SharedPtr::to_transferable`], send the [`Transferable`], and
//! adopt it there with [`Agent::from_transferable`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod agent;
pub mod block;
pub mod error;
pub mod pointer;
pub mod registry;
pub mod transfer;

pub use agent::Agent;
pub use block::BLOCK_SIZE;
pub use error::ShareError;
pub use pointer::SharedPtr;
pub use registry::{Destructor, DestructorRegistry};
pub use transfer::Transferable;

// Compile-time assertion: transfers move between threads.
const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<Transferable>();
};
