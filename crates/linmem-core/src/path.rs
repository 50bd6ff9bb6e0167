//! Dotted field paths (`"items[3].id"`, `"items[].id"`) and their
//! resolution against a [`TypeDescriptor`].
//!
//! Resolving a path walks the descriptor tree once and folds every constant
//! component into a single byte offset. Components written `[]` are left
//! open as [`DynamicIndex`] strides, to be supplied at access time; this is
//! what lets a caller build one accessor for "the id of element *i*" and
//! reuse it across a whole array.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::LayoutError;
use crate::layout::{BitField, FieldKind, FieldLayout, TypeDescriptor};
use crate::tag::TypeTag;

/// One component of a [`FieldPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Select a named field.
    Field(String),
    /// Select a constant array element.
    Index(u32),
    /// Select an array element chosen at access time.
    Dynamic,
}

/// A parsed path from a composite to one of its (possibly nested) fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: SmallVec<[PathSegment; 4]>,
}

impl FieldPath {
    /// An empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field selector.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Field(name.into()));
        self
    }

    /// Append a constant index.
    pub fn index(mut self, index: u32) -> Self {
        self.segments.push(PathSegment::Index(index));
        self
    }

    /// Append a dynamic index.
    pub fn dynamic(mut self) -> Self {
        self.segments.push(PathSegment::Dynamic);
        self
    }

    /// The components, in order.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of `[]` components.
    pub fn dynamic_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Dynamic))
            .count()
    }

    /// Parse `field ( '.' field | '[' index? ']' )*`.
    pub fn parse(text: &str) -> Result<Self, LayoutError> {
        let invalid = |reason: &str| LayoutError::InvalidPath {
            path: text.to_string(),
            reason: reason.to_string(),
        };

        let mut path = FieldPath::new();
        let mut rest = text;
        let mut expect_field = true;

        while !rest.is_empty() {
            if expect_field {
                let end = rest.find(['.', '[']).unwrap_or(rest.len());
                let name = &rest[..end];
                if name.is_empty() {
                    return Err(invalid("empty field name"));
                }
                if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(invalid("field names are alphanumeric or '_'"));
                }
                path.segments.push(PathSegment::Field(name.to_string()));
                rest = &rest[end..];
                expect_field = false;
            } else if let Some(after) = rest.strip_prefix('.') {
                if after.is_empty() {
                    return Err(invalid("trailing '.'"));
                }
                rest = after;
                expect_field = true;
            } else if let Some(after) = rest.strip_prefix('[') {
                let close = after.find(']').ok_or_else(|| invalid("unclosed '['"))?;
                let inner = after[..close].trim();
                if inner.is_empty() {
                    path.segments.push(PathSegment::Dynamic);
                } else {
                    let index = inner
                        .parse::<u32>()
                        .map_err(|_| invalid("array index must be a non-negative integer"))?;
                    path.segments.push(PathSegment::Index(index));
                }
                rest = &after[close + 1..];
            } else {
                return Err(invalid("expected '.' or '['"));
            }
        }

        if path.segments.is_empty() {
            return Err(invalid("empty path"));
        }
        Ok(path)
    }
}

impl FromStr for FieldPath {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                PathSegment::Field(name) if i == 0 => f.write_str(name)?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
                PathSegment::Dynamic => f.write_str("[]")?,
            }
        }
        Ok(())
    }
}

/// Stride and bound of one `[]` component in a resolved path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DynamicIndex {
    /// Bytes between consecutive elements.
    pub stride: u32,
    /// Number of elements.
    pub len: u32,
}

/// What a resolved path points at.
#[derive(Clone, Debug, PartialEq)]
pub enum Terminal {
    /// A primitive or pointer slot.
    Scalar {
        /// Storage format ([`TypeTag::Pointer`] for pointers).
        tag: TypeTag,
        /// Bit position, for bit-fields.
        bit_field: Option<BitField>,
        /// Declared pointee, for pointer slots.
        pointee: Option<FieldKind>,
    },
    /// A by-value nested composite.
    Struct(Arc<TypeDescriptor>),
    /// A whole array field, not indexed.
    Array(FieldLayout),
}

/// A path folded into a base offset plus open dynamic strides.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedField {
    /// Offset of the target from the root composite with every dynamic
    /// index at zero.
    pub offset: u32,
    /// One entry per `[]` component, in path order.
    pub dynamic: SmallVec<[DynamicIndex; 2]>,
    /// What sits at the target.
    pub terminal: Terminal,
}

impl ResolvedField {
    /// Offset with the dynamic indices filled in.
    ///
    /// Returns `None` if the number of indices is wrong or any index is
    /// past its array's end.
    pub fn offset_with(&self, indices: &[u32]) -> Option<u32> {
        if indices.len() != self.dynamic.len() {
            return None;
        }
        let mut offset = self.offset;
        for (dyn_idx, &i) in self.dynamic.iter().zip(indices) {
            if i >= dyn_idx.len {
                return None;
            }
            offset += dyn_idx.stride * i;
        }
        Some(offset)
    }

    /// Offset with the dynamic indices filled in, without bound checks.
    ///
    /// Missing indices count as zero and extra ones are ignored.
    pub fn offset_unchecked(&self, indices: &[u32]) -> u32 {
        self.dynamic
            .iter()
            .zip(indices)
            .fold(self.offset, |acc, (d, &i)| {
                acc.wrapping_add(d.stride.wrapping_mul(i))
            })
    }
}

impl TypeDescriptor {
    /// Resolve `path` against this descriptor.
    pub fn resolve(&self, path: &FieldPath) -> Result<ResolvedField, LayoutError> {
        let width = self.width();
        let mut desc: &TypeDescriptor = self;
        let mut current: Option<&FieldLayout> = None;
        let mut indexed = false;
        let mut offset = 0u32;
        let mut dynamic = SmallVec::new();

        if path.segments().is_empty() {
            return Err(LayoutError::InvalidPath {
                path: String::new(),
                reason: "empty path".into(),
            });
        }

        for seg in path.segments() {
            match seg {
                PathSegment::Field(name) => {
                    if let Some(field) = current {
                        desc = match (&field.kind, field.is_pointer) {
                            (FieldKind::Composite(inner), false)
                                if !field.is_array() || indexed =>
                            {
                                &**inner
                            }
                            _ => {
                                return Err(LayoutError::NotComposite {
                                    field: field.name.clone(),
                                })
                            }
                        };
                    }
                    let field = desc.field(name).ok_or_else(|| LayoutError::UnknownField {
                        descriptor: desc.name().to_string(),
                        field: name.clone(),
                    })?;
                    offset += field.byte_offset;
                    current = Some(field);
                    indexed = false;
                }
                PathSegment::Index(_) | PathSegment::Dynamic => {
                    let field = match current {
                        Some(f) => f,
                        None => {
                            return Err(LayoutError::InvalidPath {
                                path: path.to_string(),
                                reason: "path must start with a field name".into(),
                            })
                        }
                    };
                    let len = match field.array_len {
                        Some(len) if !indexed => len,
                        _ => {
                            return Err(LayoutError::NotAnArray {
                                field: field.name.clone(),
                            })
                        }
                    };
                    let stride = field.element_size(width);
                    match seg {
                        PathSegment::Index(index) => {
                            if *index >= len {
                                return Err(LayoutError::IndexOutOfRange {
                                    field: field.name.clone(),
                                    index: *index,
                                    len,
                                });
                            }
                            offset += stride * index;
                        }
                        _ => dynamic.push(DynamicIndex { stride, len }),
                    }
                    indexed = true;
                }
            }
        }

        // The loop ran at least once and always ends with a field selected.
        let field = current.ok_or_else(|| LayoutError::InvalidPath {
            path: path.to_string(),
            reason: "path selects no field".into(),
        })?;
        let terminal = if field.is_array() && !indexed {
            Terminal::Array(field.clone())
        } else {
            match (&field.kind, field.is_pointer) {
                (FieldKind::Composite(inner), false) => Terminal::Struct(Arc::clone(inner)),
                (kind, is_pointer) => Terminal::Scalar {
                    tag: if is_pointer {
                        TypeTag::Pointer
                    } else {
                        match kind {
                            FieldKind::Scalar(tag) => *tag,
                            FieldKind::Composite(_) => TypeTag::Pointer,
                        }
                    },
                    bit_field: field.bit_field,
                    pointee: is_pointer.then(|| kind.clone()),
                },
            }
        };

        Ok(ResolvedField {
            offset,
            dynamic,
            terminal,
        })
    }
}
