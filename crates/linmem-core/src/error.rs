//! Layout error types.

use std::error::Error;
use std::fmt;

use crate::address::AddressWidth;
use crate::tag::TypeTag;

/// Errors from building descriptors or resolving field paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// A field name appears twice in one descriptor.
    DuplicateField {
        /// The descriptor being built.
        descriptor: String,
        /// The repeated field name.
        field: String,
    },
    /// A field name or descriptor name is empty.
    EmptyName,
    /// A field path names a field the descriptor does not have.
    UnknownField {
        /// The descriptor that was searched.
        descriptor: String,
        /// The missing field name.
        field: String,
    },
    /// A field was declared with a tag that has no storage.
    InvalidTag {
        /// The offending field.
        field: String,
        /// The tag used.
        tag: TypeTag,
    },
    /// An array field was declared with length zero.
    EmptyArray {
        /// The offending field.
        field: String,
    },
    /// A bit-field was declared on something that cannot carry one.
    InvalidBitField {
        /// The offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A bit-field does not fit its underlying storage unit.
    BitFieldOverflow {
        /// The offending field.
        field: String,
        /// Bit offset plus width requested.
        end_bit: u32,
        /// Bits available in the storage unit.
        capacity: u32,
    },
    /// A nested descriptor uses a different address width.
    WidthMismatch {
        /// The offending field.
        field: String,
        /// Width of the enclosing descriptor.
        expected: AddressWidth,
        /// Width of the nested descriptor.
        found: AddressWidth,
    },
    /// A path indexes a field that is not an array.
    NotAnArray {
        /// The field that was indexed.
        field: String,
    },
    /// A path continues past a field that is not a by-value composite.
    NotComposite {
        /// The field that was traversed.
        field: String,
    },
    /// A constant array index is past the end of the array.
    IndexOutOfRange {
        /// The array field.
        field: String,
        /// The requested index.
        index: u32,
        /// The array length.
        len: u32,
    },
    /// A path string could not be parsed.
    InvalidPath {
        /// The path text.
        path: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A descriptor name was registered twice.
    DuplicateDescriptor {
        /// The repeated name.
        name: String,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateField { descriptor, field } => {
                write!(f, "duplicate field '{field}' in '{descriptor}'")
            }
            Self::EmptyName => write!(f, "empty field or descriptor name"),
            Self::UnknownField { descriptor, field } => {
                write!(f, "'{descriptor}' has no field '{field}'")
            }
            Self::InvalidTag { field, tag } => {
                write!(f, "field '{field}' uses non-storable tag {tag}")
            }
            Self::EmptyArray { field } => write!(f, "array field '{field}' has length 0"),
            Self::InvalidBitField { field, reason } => {
                write!(f, "invalid bit-field '{field}': {reason}")
            }
            Self::BitFieldOverflow {
                field,
                end_bit,
                capacity,
            } => write!(
                f,
                "bit-field '{field}' ends at bit {end_bit}, storage unit has {capacity} bits"
            ),
            Self::WidthMismatch {
                field,
                expected,
                found,
            } => write!(
                f,
                "field '{field}' nests a {found} descriptor inside a {expected} descriptor"
            ),
            Self::NotAnArray { field } => write!(f, "field '{field}' is not an array"),
            Self::NotComposite { field } => {
                write!(f, "field '{field}' is not a by-value composite")
            }
            Self::IndexOutOfRange { field, index, len } => {
                write!(f, "index {index} out of range for '{field}' (len {len})")
            }
            Self::InvalidPath { path, reason } => write!(f, "invalid path '{path}': {reason}"),
            Self::DuplicateDescriptor { name } => {
                write!(f, "descriptor '{name}' is already registered")
            }
        }
    }
}

impl Error for LayoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_field() {
        let e = LayoutError::IndexOutOfRange {
            field: "items".into(),
            index: 4,
            len: 4,
        };
        assert_eq!(e.to_string(), "index 4 out of range for 'items' (len 4)");
    }

    #[test]
    fn width_mismatch_display() {
        let e = LayoutError::WidthMismatch {
            field: "inner".into(),
            expected: AddressWidth::W32,
            found: AddressWidth::W64,
        };
        assert_eq!(
            e.to_string(),
            "field 'inner' nests a 64-bit descriptor inside a 32-bit descriptor"
        );
    }
}
