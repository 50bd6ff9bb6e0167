//! Memory-region and allocation error types.

use std::error::Error;
use std::fmt;

/// Errors from creating or growing a [`LinearMemory`](crate::LinearMemory).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryError {
    /// The configuration failed validation.
    InvalidConfig {
        /// What was wrong with it.
        reason: String,
    },
    /// Growing would exceed the configured maximum.
    GrowFailed {
        /// Pages requested.
        requested: u32,
        /// Pages currently accessible.
        current: u32,
        /// Configured maximum.
        max: u32,
    },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => write!(f, "invalid memory config: {reason}"),
            Self::GrowFailed {
                requested,
                current,
                max,
            } => write!(
                f,
                "cannot grow by {requested} pages: {current} of {max} pages in use"
            ),
        }
    }
}

impl Error for MemoryError {}

/// The raw allocator could not satisfy a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// `malloc` returned the null address.
    Exhausted {
        /// Bytes requested.
        requested: u64,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { requested } => {
                write!(f, "allocator exhausted: requested {requested} bytes")
            }
        }
    }
}

impl Error for AllocError {}
