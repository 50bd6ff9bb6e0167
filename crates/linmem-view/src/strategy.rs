//! How a view finds the accessor for a field.
//!
//! Two strategies satisfy the same contract:
//!
//! - [`Eager`] installs one [`FieldAccessor`] per field, and builds every
//!   nested struct and array child view, when the view is created.
//! - [`OnDemand`] keeps nothing: each access looks the field up in the
//!   descriptor, derives the accessor, and creates child views the first
//!   time they are reached.
//!
//! The choice is made at build time through [`DefaultStrategy`]; both are
//! always compiled so they can be tested against each other.

use linmem_core::{BitField, FieldLayout, TypeDescriptor, TypeTag};

/// What kind of access a field needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    /// Load/store through a tag (pointer fields use [`TypeTag::Pointer`]).
    Scalar {
        /// Storage format.
        tag: TypeTag,
        /// Bit position, for bit-fields.
        bit_field: Option<BitField>,
    },
    /// By-value nested struct or union: access yields a child view.
    Composite,
    /// Fixed-length array: access yields an array view.
    Array,
}

/// Resolved access plan for one field of a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldAccessor {
    /// Declaration index of the field.
    pub index: usize,
    /// Byte offset from the start of the composite.
    pub offset: u32,
    /// How to access it.
    pub kind: AccessKind,
}

impl FieldAccessor {
    /// Derive the accessor for `field`, declared at `index`.
    pub fn of(index: usize, field: &FieldLayout) -> Self {
        let kind = if field.is_array() {
            AccessKind::Array
        } else {
            match field.storage_tag() {
                Some(tag) => AccessKind::Scalar {
                    tag,
                    bit_field: field.bit_field,
                },
                None => AccessKind::Composite,
            }
        };
        Self {
            index,
            offset: field.byte_offset,
            kind,
        }
    }
}

/// A field-lookup strategy for [`StructView`](crate::StructView).
pub trait ViewStrategy: Sized + 'static {
    /// Per-view state built at construction.
    type State;

    /// Whether child views are built at construction.
    const EAGER: bool;

    /// Short name for diagnostics.
    const NAME: &'static str;

    /// Build the per-view state for `desc`.
    fn install(desc: &TypeDescriptor) -> Self::State;

    /// Accessor for the field called `name`, if there is one.
    fn accessor(state: &Self::State, desc: &TypeDescriptor, name: &str) -> Option<FieldAccessor>;
}

/// Install everything up front.
#[derive(Clone, Copy, Debug, Default)]
pub struct Eager;

impl ViewStrategy for Eager {
    type State = Box<[FieldAccessor]>;

    const EAGER: bool = true;
    const NAME: &'static str = "eager";

    fn install(desc: &TypeDescriptor) -> Self::State {
        desc.fields()
            .enumerate()
            .map(|(i, f)| FieldAccessor::of(i, f))
            .collect()
    }

    fn accessor(state: &Self::State, desc: &TypeDescriptor, name: &str) -> Option<FieldAccessor> {
        desc.field_index(name).map(|i| state[i])
    }
}

/// Resolve every access from the descriptor.
#[derive(Clone, Copy, Debug, Default)]
pub struct OnDemand;

impl ViewStrategy for OnDemand {
    type State = ();

    const EAGER: bool = false;
    const NAME: &'static str = "on-demand";

    fn install(_desc: &TypeDescriptor) -> Self::State {}

    fn accessor(_state: &Self::State, desc: &TypeDescriptor, name: &str) -> Option<FieldAccessor> {
        let index = desc.field_index(name)?;
        desc.field_at(index).map(|f| FieldAccessor::of(index, f))
    }
}

/// The strategy plain `StructView` uses.
#[cfg(feature = "eager")]
pub type DefaultStrategy = Eager;

/// The strategy plain `StructView` uses.
#[cfg(not(feature = "eager"))]
pub type DefaultStrategy = OnDemand;

#[cfg(test)]
mod tests {
    use super::*;
    use linmem_core::{AddressWidth, DescriptorBuilder, FieldSpec};

    #[test]
    fn strategies_agree_on_every_field() {
        let inner = DescriptorBuilder::new("Inner", AddressWidth::W32)
            .scalar("a", TypeTag::U16)
            .build()
            .unwrap();
        let desc = DescriptorBuilder::new("Outer", AddressWidth::W32)
            .scalar("n", TypeTag::I32)
            .bit_field("flag", TypeTag::U8, 1)
            .nested("inner", &inner)
            .field(FieldSpec::scalar("ptrs", TypeTag::U8).pointer().array(2))
            .pointer_to("next", &inner)
            .build()
            .unwrap();
        let eager = Eager::install(&desc);
        for f in desc.fields() {
            assert_eq!(
                Eager::accessor(&eager, &desc, &f.name),
                OnDemand::accessor(&(), &desc, &f.name)
            );
        }
        assert_eq!(Eager::accessor(&eager, &desc, "missing"), None);
        assert_eq!(
            OnDemand::accessor(&(), &desc, "next").unwrap().kind,
            AccessKind::Scalar {
                tag: TypeTag::Pointer,
                bit_field: None
            }
        );
        assert_eq!(
            OnDemand::accessor(&(), &desc, "inner").unwrap().kind,
            AccessKind::Composite
        );
        assert_eq!(
            OnDemand::accessor(&(), &desc, "ptrs").unwrap().kind,
            AccessKind::Array
        );
    }
}
