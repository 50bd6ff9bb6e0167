//! Shared-pointer error types.

use std::error::Error;
use std::fmt;

use linmem_memory::AllocError;

/// Errors from creating or adopting a [`SharedPtr`](crate::SharedPtr).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShareError {
    /// The raw allocator returned null for a payload or control block.
    Exhausted {
        /// Bytes requested.
        requested: u64,
    },
    /// Transfer bytes do not encode a control block for this region.
    InvalidTransfer {
        /// Bytes expected (the region's address width).
        expected: usize,
        /// Bytes received.
        found: usize,
    },
    /// Transfer bytes encode the null address.
    NullTransfer,
}

impl fmt::Display for ShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { requested } => {
                write!(f, "allocator exhausted: requested {requested} bytes")
            }
            Self::InvalidTransfer { expected, found } => write!(
                f,
                "transfer must be {expected} bytes for this region, got {found}"
            ),
            Self::NullTransfer => write!(f, "transfer encodes the null address"),
        }
    }
}

impl Error for ShareError {}

impl From<AllocError> for ShareError {
    fn from(e: AllocError) -> Self {
        match e {
            AllocError::Exhausted { requested } => Self::Exhausted { requested },
        }
    }
}
