//! Scalar values moved in and out of linear memory.

use std::fmt;

use crate::address::Address;

/// A scalar read from or written to memory.
///
/// Unsigned loads always produce [`Value::Unsigned`], zero-extended to
/// 64 bits, so a stored `0xFFFF_FFFF` reads back as `4294967295` and never
/// as `-1`. 64-bit integers are carried at full width.
///
/// Stores accept any variant and convert to the target tag's format with
/// `as`-cast semantics (two's-complement truncation for integers,
/// saturation for float-to-integer).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    /// A signed integer, sign-extended to 64 bits.
    Signed(i64),
    /// An unsigned integer, zero-extended to 64 bits.
    Unsigned(u64),
    /// A floating-point number.
    Float(f64),
    /// A pointer.
    Pointer(Address),
}

impl Value {
    /// The value as a signed integer (wrapping for large unsigned values).
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Signed(v) => v,
            Self::Unsigned(v) => v as i64,
            Self::Float(v) => v as i64,
            Self::Pointer(a) => a.0 as i64,
        }
    }

    /// The value as an unsigned integer (two's complement for negatives).
    pub fn as_u64(self) -> u64 {
        match self {
            Self::Signed(v) => v as u64,
            Self::Unsigned(v) => v,
            Self::Float(v) => v as i64 as u64,
            Self::Pointer(a) => a.0,
        }
    }

    /// The value as a float.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Signed(v) => v as f64,
            Self::Unsigned(v) => v as f64,
            Self::Float(v) => v,
            Self::Pointer(a) => a.0 as f64,
        }
    }

    /// The value as an address.
    pub fn as_address(self) -> Address {
        Address(self.as_u64())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Pointer(a) => write!(f, "{a}"),
        }
    }
}

macro_rules! impl_from {
    ($variant:ident, $target:ty, $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::$variant(v as $target)
                }
            }
        )*
    };
}

impl_from!(Signed, i64, i8, i16, i32, i64, isize);
impl_from!(Unsigned, u64, u8, u16, u32, u64, usize);
impl_from!(Float, f64, f32, f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Unsigned(v as u64)
    }
}

impl From<Address> for Value {
    fn from(v: Address) -> Self {
        Self::Pointer(v)
    }
}
