//! Composite type layouts: [`TypeDescriptor`] and its builder.
//!
//! A descriptor is the static, read-only "shape" of a struct or union in
//! linear memory: an ordered map from field name to [`FieldLayout`]
//! (byte offset, storage format, array/pointer/bit-field flags). Offsets
//! are computed once, when the descriptor is built, and never change.
//!
//! Descriptors are shared as `Arc<TypeDescriptor>`; nested composite fields
//! hold an `Arc` to the inner descriptor, so a layout tree is cheap to clone
//! and lives as long as anything refers to it.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::address::AddressWidth;
use crate::error::LayoutError;
use crate::tag::TypeTag;

/// Whether fields are laid out sequentially or overlapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// C struct: fields follow each other with natural-alignment padding.
    Struct,
    /// C union: every field starts at offset 0.
    Union,
}

/// What a field stores (per element, for arrays).
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    /// A primitive of the given format.
    Scalar(TypeTag),
    /// A nested struct or union.
    Composite(Arc<TypeDescriptor>),
}

/// Position of a bit-field inside its storage unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitField {
    /// Index of the lowest bit, counting from the least significant.
    pub offset: u32,
    /// Number of bits.
    pub width: u32,
}

impl BitField {
    /// Unshifted mask covering `width` bits.
    pub fn mask(self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }
}

/// Layout of one field within a [`TypeDescriptor`].
#[derive(Clone, Debug, PartialEq)]
pub struct FieldLayout {
    /// Field name, unique within its descriptor.
    pub name: String,
    /// Element storage (the pointee for pointer fields).
    pub kind: FieldKind,
    /// The field stores a pointer to `kind` rather than `kind` itself.
    pub is_pointer: bool,
    /// `Some(n)` for fixed-length arrays of `n` elements.
    pub array_len: Option<u32>,
    /// Offset of the field (or of its storage unit, for bit-fields) from
    /// the start of the enclosing composite.
    pub byte_offset: u32,
    /// Bit position for bit-fields.
    pub bit_field: Option<BitField>,
}

impl FieldLayout {
    /// Whether this is a fixed-length array.
    pub fn is_array(&self) -> bool {
        self.array_len.is_some()
    }

    /// Whether this is a bit-field.
    pub fn is_bit_field(&self) -> bool {
        self.bit_field.is_some()
    }

    /// The tag used to load or store one element, or `None` for by-value
    /// composites. Pointer fields (and pointer array elements) always use
    /// [`TypeTag::Pointer`], whatever the declared pointee.
    pub fn storage_tag(&self) -> Option<TypeTag> {
        if self.is_pointer {
            return Some(TypeTag::Pointer);
        }
        match &self.kind {
            FieldKind::Scalar(tag) => Some(*tag),
            FieldKind::Composite(_) => None,
        }
    }

    /// The nested descriptor, for composite fields and pointers to composites.
    pub fn composite(&self) -> Option<&Arc<TypeDescriptor>> {
        match &self.kind {
            FieldKind::Composite(desc) => Some(desc),
            FieldKind::Scalar(_) => None,
        }
    }

    /// Size of one element in bytes.
    pub fn element_size(&self, width: AddressWidth) -> u32 {
        element_size(&self.kind, self.is_pointer, width)
    }

    /// Alignment of one element in bytes.
    pub fn element_align(&self, width: AddressWidth) -> u32 {
        element_align(&self.kind, self.is_pointer, width)
    }

    /// Total size of the field in bytes.
    pub fn size(&self, width: AddressWidth) -> u32 {
        self.element_size(width) * self.array_len.unwrap_or(1)
    }
}

fn element_size(kind: &FieldKind, is_pointer: bool, width: AddressWidth) -> u32 {
    if is_pointer {
        return width.bytes();
    }
    match kind {
        FieldKind::Scalar(tag) => tag.size(width),
        FieldKind::Composite(desc) => desc.size(),
    }
}

fn element_align(kind: &FieldKind, is_pointer: bool, width: AddressWidth) -> u32 {
    if is_pointer {
        return width.bytes();
    }
    match kind {
        FieldKind::Scalar(tag) => tag.align(width),
        FieldKind::Composite(desc) => desc.align(),
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

/// Static layout metadata for one composite type.
///
/// Built once by [`DescriptorBuilder`] and immutable afterwards. Field
/// iteration follows declaration order.
#[derive(Debug, PartialEq)]
pub struct TypeDescriptor {
    name: String,
    kind: DescriptorKind,
    width: AddressWidth,
    fields: IndexMap<String, FieldLayout>,
    size: u32,
    align: u32,
}

impl TypeDescriptor {
    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Struct or union.
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Address width the layout was computed for.
    pub fn width(&self) -> AddressWidth {
        self.width
    }

    /// Total size in bytes, including trailing padding.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Alignment in bytes.
    pub fn align(&self) -> u32 {
        self.align
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.get(name)
    }

    /// Look up a field by declaration index.
    pub fn field_at(&self, index: usize) -> Option<&FieldLayout> {
        self.fields.get_index(index).map(|(_, f)| f)
    }

    /// Declaration index of a field.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.get_index_of(name)
    }

    /// Iterate over fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldLayout> {
        self.fields.values()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the descriptor has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether `other` has byte-for-byte the same layout (names of the
    /// descriptors themselves may differ).
    ///
    /// Used to decide when assigning one composite to another can be a
    /// raw memory copy.
    pub fn same_layout(&self, other: &TypeDescriptor) -> bool {
        std::ptr::eq(self, other)
            || (self.kind == other.kind
                && self.width == other.width
                && self.size == other.size
                && self.fields.len() == other.fields.len()
                && self
                    .fields
                    .values()
                    .zip(other.fields.values())
                    .all(|(a, b)| a == b))
    }
}

/// Declaration of one field, fed to [`DescriptorBuilder::field`].
///
/// ```rust
/// use linmem_core::{FieldSpec, TypeTag};
///
/// let flags = FieldSpec::scalar("flags", TypeTag::U8).bits(3);
/// let items = FieldSpec::scalar("items", TypeTag::U32).array(8);
/// let next = FieldSpec::scalar("next", TypeTag::Void).pointer();
/// # let _ = (flags, items, next);
/// ```
#[derive(Clone, Debug)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    is_pointer: bool,
    array_len: Option<u32>,
    bits: Option<u32>,
    offset: Option<u32>,
    bit_offset: Option<u32>,
}

impl FieldSpec {
    /// A primitive field.
    pub fn scalar(name: impl Into<String>, tag: TypeTag) -> Self {
        Self::new(name.into(), FieldKind::Scalar(tag))
    }

    /// A by-value nested composite.
    pub fn composite(name: impl Into<String>, desc: &Arc<TypeDescriptor>) -> Self {
        Self::new(name.into(), FieldKind::Composite(Arc::clone(desc)))
    }

    fn new(name: String, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            is_pointer: false,
            array_len: None,
            bits: None,
            offset: None,
            bit_offset: None,
        }
    }

    /// Store a pointer to the declared kind instead of the kind itself.
    pub fn pointer(mut self) -> Self {
        self.is_pointer = true;
        self
    }

    /// Make this a fixed-length array.
    pub fn array(mut self, len: u32) -> Self {
        self.array_len = Some(len);
        self
    }

    /// Make this a bit-field of `width` bits.
    pub fn bits(mut self, width: u32) -> Self {
        self.bits = Some(width);
        self
    }

    /// Place the field at an explicit byte offset instead of the next
    /// naturally aligned one.
    pub fn at(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Explicit bit position for a bit-field placed with [`FieldSpec::at`].
    pub fn at_bit(mut self, bit_offset: u32) -> Self {
        self.bit_offset = Some(bit_offset);
        self
    }
}

/// Running state of the bit-field storage unit being packed.
struct BitUnit {
    start: u32,
    tag: TypeTag,
    used: u32,
}

/// Builds a [`TypeDescriptor`] with C layout rules.
///
/// Struct fields are placed at the next offset aligned to their natural
/// alignment; the total size is rounded up to the largest alignment.
/// Consecutive bit-fields with the same underlying tag share a storage
/// unit until the next one would not fit. Union fields all start at 0.
///
/// ```rust
/// use linmem_core::{AddressWidth, DescriptorBuilder, TypeTag};
///
/// let point = DescriptorBuilder::new("Point", AddressWidth::W32)
///     .scalar("x", TypeTag::F32)
///     .scalar("y", TypeTag::F32)
///     .build()
///     .unwrap();
/// assert_eq!(point.size(), 8);
/// assert_eq!(point.field("y").unwrap().byte_offset, 4);
/// ```
pub struct DescriptorBuilder {
    name: String,
    kind: DescriptorKind,
    width: AddressWidth,
    specs: Vec<FieldSpec>,
}

impl DescriptorBuilder {
    /// Start a struct descriptor.
    pub fn new(name: impl Into<String>, width: AddressWidth) -> Self {
        Self {
            name: name.into(),
            kind: DescriptorKind::Struct,
            width,
            specs: Vec::new(),
        }
    }

    /// Start a union descriptor.
    pub fn union(name: impl Into<String>, width: AddressWidth) -> Self {
        Self {
            kind: DescriptorKind::Union,
            ..Self::new(name, width)
        }
    }

    /// Append a field.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Append a primitive field.
    pub fn scalar(self, name: impl Into<String>, tag: TypeTag) -> Self {
        self.field(FieldSpec::scalar(name, tag))
    }

    /// Append a pointer to a primitive (use [`TypeTag::Void`] for `void*`).
    pub fn pointer(self, name: impl Into<String>, pointee: TypeTag) -> Self {
        self.field(FieldSpec::scalar(name, pointee).pointer())
    }

    /// Append a pointer to a composite.
    pub fn pointer_to(self, name: impl Into<String>, desc: &Arc<TypeDescriptor>) -> Self {
        self.field(FieldSpec::composite(name, desc).pointer())
    }

    /// Append a fixed-length array of primitives.
    pub fn array(self, name: impl Into<String>, tag: TypeTag, len: u32) -> Self {
        self.field(FieldSpec::scalar(name, tag).array(len))
    }

    /// Append a by-value nested composite.
    pub fn nested(self, name: impl Into<String>, desc: &Arc<TypeDescriptor>) -> Self {
        self.field(FieldSpec::composite(name, desc))
    }

    /// Append a bit-field.
    pub fn bit_field(self, name: impl Into<String>, tag: TypeTag, width: u32) -> Self {
        self.field(FieldSpec::scalar(name, tag).bits(width))
    }

    /// Compute offsets and freeze the layout.
    pub fn build(mut self) -> Result<Arc<TypeDescriptor>, LayoutError> {
        if self.name.is_empty() {
            return Err(LayoutError::EmptyName);
        }
        let width = self.width;
        let mut fields: IndexMap<String, FieldLayout> = IndexMap::with_capacity(self.specs.len());
        let mut cursor = 0u32;
        let mut extent = 0u32;
        let mut max_align = 1u32;
        let mut unit: Option<BitUnit> = None;

        let specs = std::mem::take(&mut self.specs);
        for spec in specs {
            self.validate(&spec)?;
            if fields.contains_key(&spec.name) {
                return Err(LayoutError::DuplicateField {
                    descriptor: self.name.clone(),
                    field: spec.name,
                });
            }

            let align = element_align(&spec.kind, spec.is_pointer, width);
            let size =
                element_size(&spec.kind, spec.is_pointer, width) * spec.array_len.unwrap_or(1);

            let (byte_offset, bit_field) = match (spec.bits, &spec.kind) {
                (Some(bits), &FieldKind::Scalar(tag)) => {
                    let capacity = tag.bit_width(width);
                    let placed = match (spec.offset, self.kind) {
                        (Some(offset), _) => {
                            unit = None;
                            (offset, spec.bit_offset.unwrap_or(0))
                        }
                        (None, DescriptorKind::Union) => (0, 0),
                        (None, DescriptorKind::Struct) => match unit.as_mut() {
                            Some(u) if u.tag == tag && u.used + bits <= capacity => {
                                let bit_offset = u.used;
                                u.used += bits;
                                (u.start, bit_offset)
                            }
                            _ => {
                                let start = align_up(cursor, align);
                                cursor = start + size;
                                unit = Some(BitUnit {
                                    start,
                                    tag,
                                    used: bits,
                                });
                                (start, 0)
                            }
                        },
                    };
                    if placed.1 + bits > capacity {
                        return Err(LayoutError::BitFieldOverflow {
                            field: spec.name,
                            end_bit: placed.1 + bits,
                            capacity,
                        });
                    }
                    (
                        placed.0,
                        Some(BitField {
                            offset: placed.1,
                            width: bits,
                        }),
                    )
                }
                _ => {
                    unit = None;
                    let offset = match (spec.offset, self.kind) {
                        (Some(offset), _) => offset,
                        (None, DescriptorKind::Union) => 0,
                        (None, DescriptorKind::Struct) => {
                            let offset = align_up(cursor, align);
                            cursor = offset + size;
                            offset
                        }
                    };
                    (offset, None)
                }
            };

            if spec.offset.is_some() && self.kind == DescriptorKind::Struct {
                cursor = cursor.max(byte_offset + size);
            }
            extent = extent.max(byte_offset + size);
            max_align = max_align.max(align);

            fields.insert(
                spec.name.clone(),
                FieldLayout {
                    name: spec.name,
                    kind: spec.kind,
                    is_pointer: spec.is_pointer,
                    array_len: spec.array_len,
                    byte_offset,
                    bit_field,
                },
            );
        }

        let size = align_up(extent.max(cursor), max_align);
        Ok(Arc::new(TypeDescriptor {
            name: self.name,
            kind: self.kind,
            width,
            fields,
            size,
            align: max_align,
        }))
    }

    fn validate(&self, spec: &FieldSpec) -> Result<(), LayoutError> {
        if spec.name.is_empty() {
            return Err(LayoutError::EmptyName);
        }
        if spec.array_len == Some(0) {
            return Err(LayoutError::EmptyArray {
                field: spec.name.clone(),
            });
        }
        match &spec.kind {
            FieldKind::Scalar(tag) if !tag.is_storable() && !spec.is_pointer => {
                return Err(LayoutError::InvalidTag {
                    field: spec.name.clone(),
                    tag: *tag,
                });
            }
            FieldKind::Composite(desc) if desc.width() != self.width => {
                return Err(LayoutError::WidthMismatch {
                    field: spec.name.clone(),
                    expected: self.width,
                    found: desc.width(),
                });
            }
            _ => {}
        }
        if let Some(bits) = spec.bits {
            let reason = match &spec.kind {
                _ if spec.is_pointer => Some("pointer fields cannot be bit-fields"),
                _ if spec.array_len.is_some() => Some("arrays cannot be bit-fields"),
                FieldKind::Composite(_) => Some("composites cannot be bit-fields"),
                FieldKind::Scalar(tag) if !tag.is_integer() => {
                    Some("underlying tag must be an integer")
                }
                _ if bits == 0 => Some("zero width"),
                _ => None,
            };
            if let Some(reason) = reason {
                return Err(LayoutError::InvalidBitField {
                    field: spec.name.clone(),
                    reason: reason.to_string(),
                });
            }
        }
        Ok(())
    }
}
