//! Linear-memory addresses and the per-region address width.

use std::fmt;

/// A byte address inside a linear memory region.
///
/// Addresses are plain offsets from the start of the region. `0` is
/// reserved as the null address and is never a live allocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub u64);

impl Address {
    /// The null address.
    pub const NULL: Address = Address(0);

    /// Whether this is the null address.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The address `bytes` past this one.
    ///
    /// # Panics
    ///
    /// Panics on `u64` overflow.
    pub fn offset(self, bytes: u64) -> Address {
        Address(
            self.0
                .checked_add(bytes)
                .expect("address arithmetic overflowed u64"),
        )
    }

    /// The raw integer value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl From<u32> for Address {
    fn from(v: u32) -> Self {
        Self(v as u64)
    }
}

/// Width of a stored pointer.
///
/// Chosen once per memory region and never mixed: every descriptor used
/// against a region must have been laid out with the region's width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressWidth {
    /// 4-byte pointers (wasm32-style).
    #[default]
    W32,
    /// 8-byte pointers (wasm64-style).
    W64,
}

impl AddressWidth {
    /// Size of a stored pointer in bytes.
    pub const fn bytes(self) -> u32 {
        match self {
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }

    /// Largest address representable at this width.
    pub const fn max_address(self) -> u64 {
        match self {
            Self::W32 => u32::MAX as u64,
            Self::W64 => u64::MAX,
        }
    }

    /// Encode an address as little-endian bytes of this width.
    ///
    /// # Panics
    ///
    /// Panics if the address does not fit the width.
    pub fn encode(self, address: Address) -> Vec<u8> {
        assert!(
            address.0 <= self.max_address(),
            "address {address} does not fit in a {}-byte pointer",
            self.bytes()
        );
        address.0.to_le_bytes()[..self.bytes() as usize].to_vec()
    }

    /// Decode little-endian bytes of this width.
    ///
    /// Returns `None` if `bytes` has the wrong length.
    pub fn decode(self, bytes: &[u8]) -> Option<Address> {
        if bytes.len() != self.bytes() as usize {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Address(u64::from_le_bytes(buf)))
    }
}

impl fmt::Display for AddressWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::W32 => write!(f, "32-bit"),
            Self::W64 => write!(f, "64-bit"),
        }
    }
}
