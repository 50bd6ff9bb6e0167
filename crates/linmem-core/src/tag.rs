//! Scalar storage formats.

use std::fmt;

use crate::address::AddressWidth;

/// Discriminator for a primitive storage format.
///
/// Every load and store in the workspace is dispatched on a `TypeTag`
/// with a closed `match`. `Void` and `Null` exist so that layout producers
/// can describe them, but they have no storage: reading or writing through
/// either is a programming fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeTag {
    /// No storage.
    Void = 0,
    /// The null type. No storage.
    Null = 1,
    /// Signed 8-bit integer.
    I8 = 2,
    /// Unsigned 8-bit integer.
    U8 = 3,
    /// Signed 16-bit integer.
    I16 = 4,
    /// Unsigned 16-bit integer.
    U16 = 5,
    /// Signed 32-bit integer.
    I32 = 6,
    /// Unsigned 32-bit integer.
    U32 = 7,
    /// Signed 64-bit integer.
    I64 = 8,
    /// Unsigned 64-bit integer.
    U64 = 9,
    /// IEEE-754 single precision.
    F32 = 10,
    /// IEEE-754 double precision.
    F64 = 11,
    /// A pointer; 4 or 8 bytes depending on the region's [`AddressWidth`].
    Pointer = 12,
    /// Atomically accessed signed 8-bit integer.
    AtomicI8 = 13,
    /// Atomically accessed unsigned 8-bit integer.
    AtomicU8 = 14,
    /// Atomically accessed signed 16-bit integer.
    AtomicI16 = 15,
    /// Atomically accessed unsigned 16-bit integer.
    AtomicU16 = 16,
    /// Atomically accessed signed 32-bit integer.
    AtomicI32 = 17,
    /// Atomically accessed unsigned 32-bit integer.
    AtomicU32 = 18,
    /// Atomically accessed signed 64-bit integer.
    AtomicI64 = 19,
    /// Atomically accessed unsigned 64-bit integer.
    AtomicU64 = 20,
}

impl TypeTag {
    /// Every tag, in discriminant order.
    pub const ALL: [TypeTag; 21] = [
        Self::Void,
        Self::Null,
        Self::I8,
        Self::U8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Pointer,
        Self::AtomicI8,
        Self::AtomicU8,
        Self::AtomicI16,
        Self::AtomicU16,
        Self::AtomicI32,
        Self::AtomicU32,
        Self::AtomicI64,
        Self::AtomicU64,
    ];

    /// Look a tag up by its discriminant.
    pub fn from_repr(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    /// Storage size in bytes. `Void` and `Null` have size 0.
    pub const fn size(self, width: AddressWidth) -> u32 {
        match self {
            Self::Void | Self::Null => 0,
            Self::I8 | Self::U8 | Self::AtomicI8 | Self::AtomicU8 => 1,
            Self::I16 | Self::U16 | Self::AtomicI16 | Self::AtomicU16 => 2,
            Self::I32 | Self::U32 | Self::F32 | Self::AtomicI32 | Self::AtomicU32 => 4,
            Self::I64 | Self::U64 | Self::F64 | Self::AtomicI64 | Self::AtomicU64 => 8,
            Self::Pointer => width.bytes(),
        }
    }

    /// Natural alignment in bytes (equal to the size for every storable tag).
    pub const fn align(self, width: AddressWidth) -> u32 {
        match self.size(width) {
            0 => 1,
            n => n,
        }
    }

    /// Storage size in bits.
    pub const fn bit_width(self, width: AddressWidth) -> u32 {
        self.size(width) * 8
    }

    /// Whether values of this tag can be read or written.
    pub const fn is_storable(self) -> bool {
        !matches!(self, Self::Void | Self::Null)
    }

    /// Whether this is a signed integer tag (atomic or not).
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            Self::I8
                | Self::I16
                | Self::I32
                | Self::I64
                | Self::AtomicI8
                | Self::AtomicI16
                | Self::AtomicI32
                | Self::AtomicI64
        )
    }

    /// Whether this is a floating-point tag.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Whether this is an integer tag (signed or unsigned, atomic or not).
    ///
    /// Pointers are not integers for layout purposes: they cannot carry
    /// bit-fields.
    pub const fn is_integer(self) -> bool {
        self.is_storable() && !self.is_float() && !matches!(self, Self::Pointer)
    }

    /// Whether loads and stores through this tag are atomic.
    pub const fn is_atomic(self) -> bool {
        matches!(
            self,
            Self::AtomicI8
                | Self::AtomicU8
                | Self::AtomicI16
                | Self::AtomicU16
                | Self::AtomicI32
                | Self::AtomicU32
                | Self::AtomicI64
                | Self::AtomicU64
        )
    }

    /// The plain tag with the same storage format.
    pub const fn non_atomic(self) -> Self {
        match self {
            Self::AtomicI8 => Self::I8,
            Self::AtomicU8 => Self::U8,
            Self::AtomicI16 => Self::I16,
            Self::AtomicU16 => Self::U16,
            Self::AtomicI32 => Self::I32,
            Self::AtomicU32 => Self::U32,
            Self::AtomicI64 => Self::I64,
            Self::AtomicU64 => Self::U64,
            other => other,
        }
    }

    /// Short lowercase name, as used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Null => "null",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Pointer => "ptr",
            Self::AtomicI8 => "atomic_i8",
            Self::AtomicU8 => "atomic_u8",
            Self::AtomicI16 => "atomic_i16",
            Self::AtomicU16 => "atomic_u16",
            Self::AtomicI32 => "atomic_i32",
            Self::AtomicU32 => "atomic_u32",
            Self::AtomicI64 => "atomic_i64",
            Self::AtomicU64 => "atomic_u64",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_match_table() {
        for (i, tag) in TypeTag::ALL.iter().enumerate() {
            assert_eq!(*tag as u8 as usize, i);
            assert_eq!(TypeTag::from_repr(i as u8), Some(*tag));
        }
        assert_eq!(TypeTag::from_repr(21), None);
    }

    #[test]
    fn pointer_size_follows_width() {
        assert_eq!(TypeTag::Pointer.size(AddressWidth::W32), 4);
        assert_eq!(TypeTag::Pointer.size(AddressWidth::W64), 8);
    }

    #[test]
    fn void_and_null_are_not_storable() {
        assert!(!TypeTag::Void.is_storable());
        assert!(!TypeTag::Null.is_storable());
        assert_eq!(TypeTag::Void.size(AddressWidth::W64), 0);
        assert_eq!(TypeTag::Null.align(AddressWidth::W64), 1);
    }

    #[test]
    fn atomic_variants_share_storage() {
        for tag in TypeTag::ALL.iter().filter(|t| t.is_atomic()) {
            let plain = tag.non_atomic();
            assert!(!plain.is_atomic());
            assert_eq!(tag.size(AddressWidth::W32), plain.size(AddressWidth::W32));
            assert_eq!(tag.is_signed(), plain.is_signed());
        }
    }

    #[test]
    fn integer_classification() {
        assert!(TypeTag::U16.is_integer());
        assert!(TypeTag::AtomicI64.is_integer());
        assert!(!TypeTag::F32.is_integer());
        assert!(!TypeTag::Pointer.is_integer());
        assert!(!TypeTag::Void.is_integer());
    }
}
