//! What field reads produce and field writes accept.

use std::sync::Arc;

use linmem_core::{Address, FieldLayout, TypeDescriptor, Value};

use crate::array::ArrayView;
use crate::strategy::{DefaultStrategy, ViewStrategy};
use crate::view::StructView;

/// Result of reading a field.
pub enum FieldValue<S: ViewStrategy = DefaultStrategy> {
    /// A primitive or pointer value.
    Scalar(Value),
    /// A view over a nested struct or union.
    Struct(StructView<S>),
    /// A view over an array.
    Array(ArrayView<S>),
}

impl<S: ViewStrategy> FieldValue<S> {
    /// The scalar value, if this is one.
    pub fn as_value(&self) -> Option<Value> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The nested view, if this is one.
    pub fn as_struct(&self) -> Option<&StructView<S>> {
        match self {
            Self::Struct(v) => Some(v),
            _ => None,
        }
    }

    /// The array view, if this is one.
    pub fn as_array(&self) -> Option<&ArrayView<S>> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// The scalar value.
    ///
    /// # Panics
    ///
    /// Panics if the field is a struct or array.
    pub fn into_value(self) -> Value {
        match self {
            Self::Scalar(v) => v,
            Self::Struct(v) => {
                panic!("field is a '{}' struct, not a scalar", v.descriptor().name())
            }
            Self::Array(_) => panic!("field is an array, not a scalar"),
        }
    }

    /// The nested view.
    ///
    /// # Panics
    ///
    /// Panics if the field is not a struct or union.
    pub fn into_struct(self) -> StructView<S> {
        match self {
            Self::Struct(v) => v,
            _ => panic!("field is not a struct"),
        }
    }

    /// The array view.
    ///
    /// # Panics
    ///
    /// Panics if the field is not an array.
    pub fn into_array(self) -> ArrayView<S> {
        match self {
            Self::Array(v) => v,
            _ => panic!("field is not an array"),
        }
    }
}

impl<S: ViewStrategy> std::fmt::Debug for FieldValue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Self::Struct(v) => f.debug_tuple("Struct").field(v).finish(),
            Self::Array(v) => f.debug_tuple("Array").field(v).finish(),
        }
    }
}

/// Layout of the bytes a [`FieldInput::CopyFrom`] copies.
#[derive(Clone, Debug, PartialEq)]
pub enum CopySource {
    /// A whole struct or union.
    Struct(Arc<TypeDescriptor>),
    /// A whole array field.
    Array(FieldLayout),
}

/// Value accepted by a field write.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldInput {
    /// A primitive or pointer value.
    Scalar(Value),
    /// Member-wise assignment to a struct: each named member is set in turn.
    Members(Vec<(String, FieldInput)>),
    /// Element-wise assignment to an array, from index 0.
    Elements(Vec<FieldInput>),
    /// Raw copy from an existing struct or array with the same layout.
    CopyFrom {
        /// Start of the source bytes.
        address: Address,
        /// Their layout, checked against the destination.
        source: CopySource,
    },
}

impl FieldInput {
    /// Member-wise input from `(name, value)` pairs.
    pub fn members<I, K, V>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldInput>,
    {
        Self::Members(
            members
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Element-wise input.
    pub fn elements<I, V>(elements: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldInput>,
    {
        Self::Elements(elements.into_iter().map(Into::into).collect())
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "a scalar",
            Self::Members(_) => "a member list",
            Self::Elements(_) => "an element list",
            Self::CopyFrom { .. } => "a raw copy",
        }
    }
}

macro_rules! input_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FieldInput {
                fn from(v: $t) -> Self {
                    Self::Scalar(Value::from(v))
                }
            }
        )*
    };
}

input_from!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, Address);

impl From<Value> for FieldInput {
    fn from(v: Value) -> Self {
        Self::Scalar(v)
    }
}

impl<S: ViewStrategy> From<&StructView<S>> for FieldInput {
    fn from(view: &StructView<S>) -> Self {
        Self::CopyFrom {
            address: view.address(),
            source: CopySource::Struct(Arc::clone(view.descriptor())),
        }
    }
}

impl<S: ViewStrategy> From<&ArrayView<S>> for FieldInput {
    fn from(view: &ArrayView<S>) -> Self {
        Self::CopyFrom {
            address: view.address(),
            source: CopySource::Array(view.layout().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders() {
        let m = FieldInput::members([("x", 1i32), ("y", 2i32)]);
        assert_eq!(
            m,
            FieldInput::Members(vec![
                ("x".into(), FieldInput::Scalar(Value::Signed(1))),
                ("y".into(), FieldInput::Scalar(Value::Signed(2))),
            ])
        );
        let e = FieldInput::elements([1.5f32, 2.5]);
        assert_eq!(e.describe(), "an element list");
        assert_eq!(FieldInput::from(7u8), FieldInput::Scalar(Value::Unsigned(7)));
    }
}
