//! Views over fixed-length array fields.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use linmem_core::{Address, FieldLayout, TypeDescriptor, TypeTag, Value};
use linmem_memory::MemoryAccessor;

use crate::anchor::Anchor;
use crate::strategy::{DefaultStrategy, ViewStrategy};
use crate::value::{CopySource, FieldInput, FieldValue};
use crate::view::StructView;
use crate::CHECKED;

struct ArrayInner<S: ViewStrategy> {
    anchor: Rc<Anchor>,
    field: FieldLayout,
    len: u32,
    stride: u32,
    acc: MemoryAccessor,
    /// Cached element views, for arrays of composites.
    elements: RefCell<HashMap<u32, StructView<S>>>,
}

/// A window onto one array field.
///
/// Scalar elements are read and written directly; pointer elements always
/// use the pointer tag whatever the declared pointee. Composite elements
/// come back as cached [`StructView`]s positioned relative to the array.
pub struct ArrayView<S: ViewStrategy = DefaultStrategy> {
    inner: Rc<ArrayInner<S>>,
}

impl<S: ViewStrategy> Clone for ArrayView<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: ViewStrategy> ArrayView<S> {
    pub(crate) fn with_anchor(acc: MemoryAccessor, anchor: Rc<Anchor>, field: FieldLayout) -> Self {
        let len = match field.array_len {
            Some(len) => len,
            None => panic!("field '{}' is not an array", field.name),
        };
        let stride = field.element_size(acc.width());
        let view = Self {
            inner: Rc::new(ArrayInner {
                anchor,
                field,
                len,
                stride,
                acc,
                elements: RefCell::new(HashMap::new()),
            }),
        };
        if S::EAGER && view.element_descriptor().is_some() {
            for i in 0..len {
                view.element_view(i);
            }
        }
        view
    }

    pub(crate) fn revalidate(&self, parent: &Rc<Anchor>, offset: u32) {
        self.inner.anchor.revalidate(parent, offset, false);
    }

    /// Number of elements.
    pub fn len(&self) -> u32 {
        self.inner.len
    }

    /// Whether the array has no elements (never true for a valid layout).
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Bytes between consecutive elements.
    pub fn stride(&self) -> u32 {
        self.inner.stride
    }

    /// Address of element 0.
    pub fn address(&self) -> Address {
        self.inner.anchor.address(&self.inner.acc)
    }

    /// The array field's layout.
    pub fn layout(&self) -> &FieldLayout {
        &self.inner.field
    }

    /// Tag of scalar elements; `None` for arrays of composites.
    pub fn element_tag(&self) -> Option<TypeTag> {
        self.inner.field.storage_tag()
    }

    fn element_descriptor(&self) -> Option<&Arc<TypeDescriptor>> {
        match self.inner.field.storage_tag() {
            Some(_) => None,
            None => self.inner.field.composite(),
        }
    }

    /// Mark this array and its element views unusable.
    pub fn detach(&self) {
        self.inner.anchor.detach();
    }

    /// Whether this array, or an ancestor, has been detached.
    pub fn is_detached(&self) -> bool {
        self.inner.anchor.is_detached()
    }

    #[inline]
    fn check_index(&self, index: u32) {
        if CHECKED {
            assert!(
                index < self.inner.len,
                "index {index} out of bounds for '{}' (len {})",
                self.inner.field.name,
                self.inner.len
            );
        }
    }

    fn element_address(&self, index: u32) -> Address {
        self.address()
            .offset(index as u64 * self.inner.stride as u64)
    }

    fn element_view(&self, index: u32) -> StructView<S> {
        let offset = index * self.inner.stride;
        if let Some(view) = self.inner.elements.borrow().get(&index) {
            view.anchor_revalidate(&self.inner.anchor, offset);
            return view.clone();
        }
        let desc = match self.element_descriptor() {
            Some(desc) => Arc::clone(desc),
            None => panic!("'{}' does not hold composites", self.inner.field.name),
        };
        let view = StructView::with_anchor(
            self.inner.acc.clone(),
            Anchor::nested(&self.inner.anchor, offset),
            desc,
        );
        self.inner.elements.borrow_mut().insert(index, view.clone());
        view
    }

    /// Read element `index`.
    ///
    /// # Panics
    ///
    /// With checks enabled, panics if `index` is out of bounds or the view
    /// is detached.
    pub fn get(&self, index: u32) -> FieldValue<S> {
        self.inner.anchor.check_live();
        self.check_index(index);
        match self.element_tag() {
            Some(tag) => FieldValue::Scalar(self.inner.acc.read(tag, self.element_address(index))),
            None => FieldValue::Struct(self.element_view(index)),
        }
    }

    /// Read scalar element `index`.
    pub fn value(&self, index: u32) -> Value {
        self.get(index).into_value()
    }

    /// Write element `index`.
    ///
    /// # Panics
    ///
    /// Panics on input of the wrong shape; with checks enabled, also if
    /// `index` is out of bounds or the view is detached.
    pub fn set(&self, index: u32, input: impl Into<FieldInput>) {
        self.inner.anchor.check_live();
        self.check_index(index);
        match (self.element_tag(), input.into()) {
            (Some(tag), FieldInput::Scalar(value)) => {
                self.inner.acc.write(tag, self.element_address(index), value)
            }
            (Some(_), other) => panic!(
                "cannot assign {} to a scalar element of '{}'",
                other.describe(),
                self.inner.field.name
            ),
            (None, input) => self.element_view(index).assign(input),
        }
    }

    /// Assign to the whole array.
    ///
    /// # Panics
    ///
    /// Panics unless `input` is an element list no longer than the array or
    /// a raw copy from an array with the same element layout and length.
    pub fn assign(&self, input: impl Into<FieldInput>) {
        self.inner.anchor.check_live();
        match input.into() {
            FieldInput::Elements(items) => {
                assert!(
                    items.len() <= self.inner.len as usize,
                    "{} elements do not fit '{}' (len {})",
                    items.len(),
                    self.inner.field.name,
                    self.inner.len
                );
                for (i, item) in items.into_iter().enumerate() {
                    self.set(i as u32, item);
                }
            }
            FieldInput::CopyFrom {
                address,
                source: CopySource::Array(src),
            } => {
                let mine = &self.inner.field;
                assert!(
                    src.kind == mine.kind
                        && src.is_pointer == mine.is_pointer
                        && src.array_len == mine.array_len,
                    "cannot copy array '{}' into '{}': layouts differ",
                    src.name,
                    mine.name
                );
                let bytes = self.inner.len as usize * self.inner.stride as usize;
                self.inner.acc.copy(self.address(), address, bytes);
            }
            other => panic!(
                "cannot assign {} to array '{}'",
                other.describe(),
                self.inner.field.name
            ),
        }
    }

    /// Every element, in order.
    pub fn iter(&self) -> impl Iterator<Item = FieldValue<S>> + '_ {
        (0..self.inner.len).map(move |i| self.get(i))
    }

    /// Every scalar element, in order.
    ///
    /// # Panics
    ///
    /// Panics if the elements are composites.
    pub fn to_values(&self) -> Vec<Value> {
        self.iter().map(FieldValue::into_value).collect()
    }
}

impl<S: ViewStrategy> fmt::Debug for ArrayView<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayView")
            .field("field", &self.inner.field.name)
            .field("len", &self.inner.len)
            .field("stride", &self.inner.stride)
            .field("detached", &self.is_detached())
            .finish()
    }
}
