//! Typed views over structs and unions in linear memory.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use linmem_core::{Address, FieldLayout, FieldPath, ResolvedField, Terminal, TypeDescriptor, Value};
use linmem_memory::{AllocError, MemoryAccessor, RawAllocator};

use crate::anchor::{Anchor, DetachHandle};
use crate::array::ArrayView;
use crate::scalar;
use crate::strategy::{AccessKind, DefaultStrategy, FieldAccessor, ViewStrategy};
use crate::value::{CopySource, FieldInput, FieldValue};
use crate::CHECKED;

enum Child<S: ViewStrategy> {
    Struct(StructView<S>),
    Array(ArrayView<S>),
}

struct ViewInner<S: ViewStrategy> {
    anchor: Rc<Anchor>,
    desc: Arc<TypeDescriptor>,
    acc: MemoryAccessor,
    state: S::State,
    /// Cached child views by field index.
    children: RefCell<Vec<Option<Child<S>>>>,
}

/// A typed window onto a struct or union at some address.
///
/// Field reads return a [`FieldValue`]; writes accept anything convertible
/// to a [`FieldInput`]. Nested composites and arrays come back as child
/// views, cached on the parent and always positioned relative to the
/// parent's *current* address, so [`set_address`](Self::set_address)
/// moves the whole tree at once.
///
/// Views are agent-local (`!Send`). Clones share position, cache, and
/// detach state.
///
/// ```rust
/// use std::sync::Arc;
/// use linmem_core::{Address, AddressWidth, DescriptorBuilder, TypeTag, Value};
/// use linmem_memory::{LinearMemory, MemoryAccessor, MemoryConfig};
/// use linmem_view::StructView;
///
/// let acc = MemoryAccessor::new(LinearMemory::shared(MemoryConfig::default()).unwrap());
/// let point = DescriptorBuilder::new("Point", AddressWidth::W32)
///     .scalar("x", TypeTag::I32)
///     .scalar("y", TypeTag::I32)
///     .build()
///     .unwrap();
///
/// let view: StructView = StructView::new(acc, Address(64), point);
/// view.set("x", -4);
/// assert_eq!(view.value("x"), Value::Signed(-4));
/// ```
pub struct StructView<S: ViewStrategy = DefaultStrategy> {
    inner: Rc<ViewInner<S>>,
}

impl<S: ViewStrategy> Clone for StructView<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: ViewStrategy> StructView<S> {
    /// View the composite `desc` at `address`.
    ///
    /// # Panics
    ///
    /// Panics if `desc` was laid out for a different address width than
    /// the region behind `acc`.
    pub fn new(acc: MemoryAccessor, address: Address, desc: Arc<TypeDescriptor>) -> Self {
        Self::with_anchor(acc, Anchor::fixed(address), desc)
    }

    pub(crate) fn with_anchor(
        acc: MemoryAccessor,
        anchor: Rc<Anchor>,
        desc: Arc<TypeDescriptor>,
    ) -> Self {
        assert_eq!(
            desc.width(),
            acc.width(),
            "descriptor '{}' was laid out for {} pointers, region uses {}",
            desc.name(),
            desc.width(),
            acc.width()
        );
        let state = S::install(&desc);
        let children = RefCell::new((0..desc.len()).map(|_| None).collect());
        let view = Self {
            inner: Rc::new(ViewInner {
                anchor,
                desc,
                acc,
                state,
                children,
            }),
        };
        if S::EAGER {
            view.populate();
        }
        view
    }

    /// Build every nested struct and array child up front.
    fn populate(&self) {
        for (index, field) in self.inner.desc.fields().enumerate() {
            let fa = FieldAccessor::of(index, field);
            match fa.kind {
                AccessKind::Composite => {
                    self.child_struct(&fa);
                }
                AccessKind::Array => {
                    self.child_array(&fa);
                }
                AccessKind::Scalar { .. } => {}
            }
        }
    }

    /// Allocate a zeroed instance of `desc` and view it.
    pub fn alloc<A>(
        acc: &MemoryAccessor,
        allocator: &A,
        desc: &Arc<TypeDescriptor>,
    ) -> Result<Self, AllocError>
    where
        A: RawAllocator + ?Sized,
    {
        let size = desc.size() as u64;
        let address = allocator.malloc(size);
        if address.is_null() {
            return Err(AllocError::Exhausted { requested: size });
        }
        acc.fill(address, 0, size as usize);
        tracing::trace!(%address, size, ty = desc.name(), "allocated struct");
        Ok(Self::new(acc.clone(), address, Arc::clone(desc)))
    }

    /// Detach this view and release its memory.
    pub fn free<A>(self, allocator: &A)
    where
        A: RawAllocator + ?Sized,
    {
        self.inner.anchor.check_live();
        let address = self.address();
        self.detach();
        allocator.free(address);
        tracing::trace!(%address, ty = self.inner.desc.name(), "freed struct");
    }

    /// Current address.
    pub fn address(&self) -> Address {
        self.inner.anchor.address(&self.inner.acc)
    }

    /// Move the view (and with it every child view) to `address`.
    pub fn set_address(&self, address: Address) {
        self.inner.anchor.reposition(address);
    }

    /// The layout being viewed.
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.inner.desc
    }

    /// The accessor behind the view.
    pub fn accessor(&self) -> &MemoryAccessor {
        &self.inner.acc
    }

    /// Name of the lookup strategy.
    pub fn strategy(&self) -> &'static str {
        S::NAME
    }

    /// Mark this view and all its descendants unusable.
    ///
    /// With checks enabled (debug builds or the `checked` feature) any later
    /// access through them panics.
    pub fn detach(&self) {
        self.inner.anchor.detach();
    }

    /// A weak handle that detaches this view (and its descendants) later,
    /// for whoever owns the memory behind it.
    pub fn detach_handle(&self) -> DetachHandle {
        DetachHandle::new(&self.inner.anchor)
    }

    /// Whether this view, or an ancestor, has been detached.
    pub fn is_detached(&self) -> bool {
        self.inner.anchor.is_detached()
    }

    pub(crate) fn anchor_revalidate(&self, parent: &Rc<Anchor>, offset: u32) {
        self.inner.anchor.revalidate(parent, offset, false);
    }

    fn accessor_for(&self, name: &str) -> FieldAccessor {
        match S::accessor(&self.inner.state, &self.inner.desc, name) {
            Some(fa) => fa,
            None => panic!("'{}' has no field '{name}'", self.inner.desc.name()),
        }
    }

    fn layout(&self, index: usize) -> &FieldLayout {
        match self.inner.desc.field_at(index) {
            Some(f) => f,
            None => panic!("'{}' has no field #{index}", self.inner.desc.name()),
        }
    }

    // ── Field access ───────────────────────────────────────────────

    /// Read a field.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor has no such field, and (with checks
    /// enabled) if the view is detached.
    pub fn get(&self, name: &str) -> FieldValue<S> {
        self.inner.anchor.check_live();
        let fa = self.accessor_for(name);
        match fa.kind {
            AccessKind::Scalar { tag, bit_field } => FieldValue::Scalar(scalar::read(
                &self.inner.acc,
                self.address().offset(fa.offset as u64),
                tag,
                bit_field,
            )),
            AccessKind::Composite => FieldValue::Struct(self.child_struct(&fa)),
            AccessKind::Array => FieldValue::Array(self.child_array(&fa)),
        }
    }

    /// Read a scalar field.
    ///
    /// # Panics
    ///
    /// As [`get`](Self::get), and if the field is a struct or array.
    pub fn value(&self, name: &str) -> Value {
        self.get(name).into_value()
    }

    /// Write a field.
    ///
    /// Scalars (and pointers) take a scalar; struct fields take a member
    /// list or a same-layout struct (raw copy); array fields take an
    /// element list or a same-layout array (raw copy).
    ///
    /// # Panics
    ///
    /// Panics on unknown fields, on input of the wrong shape, and (with
    /// checks enabled) if the view is detached.
    pub fn set(&self, name: &str, input: impl Into<FieldInput>) {
        self.inner.anchor.check_live();
        let fa = self.accessor_for(name);
        let input = input.into();
        match (fa.kind, input) {
            (AccessKind::Scalar { tag, bit_field }, FieldInput::Scalar(value)) => scalar::write(
                &self.inner.acc,
                self.address().offset(fa.offset as u64),
                tag,
                bit_field,
                value,
            ),
            (AccessKind::Scalar { .. }, other) => panic!(
                "cannot assign {} to scalar field '{name}' of '{}'",
                other.describe(),
                self.inner.desc.name()
            ),
            (AccessKind::Composite, input) => self.child_struct(&fa).assign(input),
            (AccessKind::Array, input) => self.child_array(&fa).assign(input),
        }
    }

    /// Assign to the whole struct.
    ///
    /// # Panics
    ///
    /// Panics unless `input` is a member list or a raw copy from a struct
    /// with the same layout.
    pub fn assign(&self, input: impl Into<FieldInput>) {
        self.inner.anchor.check_live();
        match input.into() {
            FieldInput::Members(members) => {
                for (name, value) in members {
                    self.set(&name, value);
                }
            }
            FieldInput::CopyFrom {
                address,
                source: CopySource::Struct(src),
            } => {
                assert!(
                    src.same_layout(&self.inner.desc),
                    "cannot copy a '{}' into a '{}': layouts differ",
                    src.name(),
                    self.inner.desc.name()
                );
                self.inner
                    .acc
                    .copy(self.address(), address, self.inner.desc.size() as usize);
            }
            other => panic!(
                "cannot assign {} to struct '{}'",
                other.describe(),
                self.inner.desc.name()
            ),
        }
    }

    /// View of the composite a pointer field points at.
    ///
    /// The pointer is re-read on every access through the returned view.
    ///
    /// # Panics
    ///
    /// Panics if the field is not a pointer to a struct or union. With
    /// checks enabled, accesses through the view panic while the pointer
    /// is null.
    pub fn deref(&self, name: &str) -> StructView<S> {
        self.inner.anchor.check_live();
        let fa = self.accessor_for(name);
        let field = self.layout(fa.index);
        let target = match (field.is_pointer, field.is_array(), field.composite()) {
            (true, false, Some(desc)) => Arc::clone(desc),
            _ => panic!(
                "field '{name}' of '{}' is not a pointer to a composite",
                self.inner.desc.name()
            ),
        };
        let mut children = self.inner.children.borrow_mut();
        if let Some(Child::Struct(view)) = &children[fa.index] {
            view.inner.anchor.revalidate(&self.inner.anchor, fa.offset, true);
            return view.clone();
        }
        let view = StructView::with_anchor(
            self.inner.acc.clone(),
            Anchor::deref(&self.inner.anchor, fa.offset),
            target,
        );
        children[fa.index] = Some(Child::Struct(view.clone()));
        view
    }

    fn child_struct(&self, fa: &FieldAccessor) -> StructView<S> {
        if let Some(Child::Struct(view)) = &self.inner.children.borrow()[fa.index] {
            view.inner.anchor.revalidate(&self.inner.anchor, fa.offset, false);
            return view.clone();
        }
        let desc = match self.layout(fa.index).composite() {
            Some(desc) => Arc::clone(desc),
            None => panic!("field #{} is not a composite", fa.index),
        };
        let view = StructView::with_anchor(
            self.inner.acc.clone(),
            Anchor::nested(&self.inner.anchor, fa.offset),
            desc,
        );
        self.inner.children.borrow_mut()[fa.index] = Some(Child::Struct(view.clone()));
        view
    }

    fn child_array(&self, fa: &FieldAccessor) -> ArrayView<S> {
        if let Some(Child::Array(view)) = &self.inner.children.borrow()[fa.index] {
            view.revalidate(&self.inner.anchor, fa.offset);
            return view.clone();
        }
        let view = ArrayView::with_anchor(
            self.inner.acc.clone(),
            Anchor::nested(&self.inner.anchor, fa.offset),
            self.layout(fa.index).clone(),
        );
        self.inner.children.borrow_mut()[fa.index] = Some(Child::Array(view.clone()));
        view
    }

    // ── Paths ──────────────────────────────────────────────────────

    /// Read through a nested path such as `"items[].id"`, filling `[]`
    /// components from `indices` in order.
    ///
    /// # Panics
    ///
    /// Panics if the path does not resolve against the descriptor, and
    /// (with checks enabled) on a dynamic index out of range.
    pub fn get_path(&self, path: &FieldPath, indices: &[u32]) -> FieldValue<S> {
        let resolved = self.resolve(path);
        self.get_resolved(&resolved, indices)
    }

    /// Write through a nested path.
    ///
    /// # Panics
    ///
    /// As [`get_path`](Self::get_path), and on input of the wrong shape.
    pub fn set_path(&self, path: &FieldPath, indices: &[u32], input: impl Into<FieldInput>) {
        let resolved = self.resolve(path);
        self.set_resolved(&resolved, indices, input);
    }

    /// Resolve `path` against this view's descriptor.
    ///
    /// # Panics
    ///
    /// Panics if it does not resolve.
    pub fn resolve(&self, path: &FieldPath) -> ResolvedField {
        match self.inner.desc.resolve(path) {
            Ok(r) => r,
            Err(err) => panic!("cannot resolve '{path}': {err}"),
        }
    }

    fn resolved_offset(&self, resolved: &ResolvedField, indices: &[u32]) -> u32 {
        if CHECKED {
            match resolved.offset_with(indices) {
                Some(offset) => offset,
                None => panic!(
                    "dynamic indices {indices:?} out of range for {:?}",
                    resolved.dynamic
                ),
            }
        } else {
            resolved.offset_unchecked(indices)
        }
    }

    /// Read through a path resolved earlier with [`resolve`](Self::resolve).
    pub fn get_resolved(&self, resolved: &ResolvedField, indices: &[u32]) -> FieldValue<S> {
        self.inner.anchor.check_live();
        let offset = self.resolved_offset(resolved, indices);
        match &resolved.terminal {
            Terminal::Scalar { tag, bit_field, .. } => FieldValue::Scalar(scalar::read(
                &self.inner.acc,
                self.address().offset(offset as u64),
                *tag,
                *bit_field,
            )),
            Terminal::Struct(desc) => FieldValue::Struct(StructView::with_anchor(
                self.inner.acc.clone(),
                Anchor::nested(&self.inner.anchor, offset),
                Arc::clone(desc),
            )),
            Terminal::Array(field) => FieldValue::Array(ArrayView::with_anchor(
                self.inner.acc.clone(),
                Anchor::nested(&self.inner.anchor, offset),
                field.clone(),
            )),
        }
    }

    /// Write through a path resolved earlier with [`resolve`](Self::resolve).
    pub fn set_resolved(
        &self,
        resolved: &ResolvedField,
        indices: &[u32],
        input: impl Into<FieldInput>,
    ) {
        self.inner.anchor.check_live();
        let input = input.into();
        match (&resolved.terminal, input) {
            (Terminal::Scalar { tag, bit_field, .. }, FieldInput::Scalar(value)) => {
                let offset = self.resolved_offset(resolved, indices);
                scalar::write(
                    &self.inner.acc,
                    self.address().offset(offset as u64),
                    *tag,
                    *bit_field,
                    value,
                );
            }
            (Terminal::Scalar { .. }, other) => {
                panic!("cannot assign {} to a scalar path", other.describe())
            }
            (Terminal::Struct(desc), input) => {
                let offset = self.resolved_offset(resolved, indices);
                StructView::<S>::with_anchor(
                    self.inner.acc.clone(),
                    Anchor::nested(&self.inner.anchor, offset),
                    Arc::clone(desc),
                )
                .assign(input);
            }
            (Terminal::Array(field), input) => {
                let offset = self.resolved_offset(resolved, indices);
                ArrayView::<S>::with_anchor(
                    self.inner.acc.clone(),
                    Anchor::nested(&self.inner.anchor, offset),
                    field.clone(),
                )
                .assign(input);
            }
        }
    }

    // ── Whole-struct helpers ───────────────────────────────────────

    /// Copy of the struct's bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.anchor.check_live();
        self.inner
            .acc
            .to_vec(self.address(), self.inner.desc.size() as usize)
    }

    /// Zero the struct's bytes.
    pub fn zero(&self) {
        self.inner.anchor.check_live();
        self.inner
            .acc
            .fill(self.address(), 0, self.inner.desc.size() as usize);
    }
}

impl<S: ViewStrategy> fmt::Debug for StructView<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("StructView");
        d.field("type", &self.inner.desc.name())
            .field("strategy", &S::NAME)
            .field("detached", &self.is_detached());
        if !self.is_detached() {
            d.field("address", &self.address());
        }
        d.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{Eager, OnDemand};
    use linmem_core::{AddressWidth, DescriptorBuilder, FieldSpec, TypeTag};
    use linmem_memory::{HeapAllocator, LinearMemory, MemoryConfig};

    fn acc() -> MemoryAccessor {
        MemoryAccessor::new(LinearMemory::shared(MemoryConfig::new(AddressWidth::W32)).unwrap())
    }

    fn vec2() -> Arc<TypeDescriptor> {
        DescriptorBuilder::new("Vec2", AddressWidth::W32)
            .scalar("x", TypeTag::F32)
            .scalar("y", TypeTag::F32)
            .build()
            .unwrap()
    }

    fn body() -> Arc<TypeDescriptor> {
        let v = vec2();
        DescriptorBuilder::new("Body", AddressWidth::W32)
            .scalar("id", TypeTag::U32)
            .nested("pos", &v)
            .field(FieldSpec::composite("trail", &v).array(3))
            .bit_field("alive", TypeTag::U8, 1)
            .bit_field("kind", TypeTag::U8, 3)
            .pointer_to("target", &v)
            .build()
            .unwrap()
    }

    #[test]
    fn scalar_round_trip() {
        let view: StructView<OnDemand> = StructView::new(acc(), Address(64), body());
        view.set("id", 0xFFFF_FFFFu32);
        assert_eq!(view.value("id"), Value::Unsigned(4_294_967_295));
    }

    #[test]
    fn nested_child_is_cached_and_follows_parent() {
        let view: StructView<OnDemand> = StructView::new(acc(), Address(64), body());
        let pos = view.get("pos").into_struct();
        assert_eq!(pos.address(), Address(68));
        pos.set("y", 2.5f32);
        view.set_address(Address(256));
        let again = view.get("pos").into_struct();
        assert!(Rc::ptr_eq(&pos.inner, &again.inner));
        assert_eq!(pos.address(), Address(260));
        assert_eq!(again.value("y"), Value::Float(0.0));
    }

    #[test]
    fn repositioned_child_is_relinked_on_access() {
        let view: StructView<Eager> = StructView::new(acc(), Address(64), body());
        let pos = view.get("pos").into_struct();
        pos.set_address(Address(1024));
        let again = view.get("pos").into_struct();
        assert_eq!(again.address(), Address(68));
    }

    #[test]
    fn member_wise_and_raw_copy_assignment() {
        let acc = acc();
        let a: StructView = StructView::new(acc.clone(), Address(64), body());
        let b: StructView = StructView::new(acc, Address(512), body());
        a.set("pos", FieldInput::members([("x", 1.0f32), ("y", 2.0f32)]));
        a.set("id", 9u32);
        b.assign(&a);
        assert_eq!(a.to_bytes(), b.to_bytes());
        let pos = a.get("pos").into_struct();
        b.set("trail", FieldInput::elements([&pos, &pos, &pos]));
        let trail = b.get("trail").into_array();
        assert_eq!(trail.get(2).into_struct().value("y"), Value::Float(2.0));
    }

    #[test]
    #[should_panic(expected = "layouts differ")]
    fn raw_copy_rejects_other_layout() {
        let acc = acc();
        let a: StructView = StructView::new(acc.clone(), Address(64), body());
        let v: StructView = StructView::new(acc, Address(512), vec2());
        a.assign(&v);
    }

    #[test]
    fn bit_fields_are_isolated() {
        let view: StructView = StructView::new(acc(), Address(64), body());
        view.set("kind", 5u8);
        view.set("alive", 1u8);
        view.set("alive", 0u8);
        assert_eq!(view.value("kind"), Value::Unsigned(5));
        assert_eq!(view.value("alive"), Value::Unsigned(0));
    }

    #[test]
    fn deref_follows_pointer_changes() {
        let acc = acc();
        let view: StructView = StructView::new(acc.clone(), Address(64), body());
        let t1: StructView = StructView::new(acc.clone(), Address(1024), vec2());
        let t2: StructView = StructView::new(acc, Address(2048), vec2());
        t1.set("x", 1.0f32);
        t2.set("x", 2.0f32);
        view.set("target", t1.address());
        let target = view.deref("target");
        assert_eq!(target.value("x"), Value::Float(1.0));
        view.set("target", t2.address());
        assert_eq!(target.value("x"), Value::Float(2.0));
        assert_eq!(view.value("target"), Value::Pointer(Address(2048)));
    }

    #[test]
    fn paths_with_dynamic_indices() {
        let view: StructView = StructView::new(acc(), Address(64), body());
        let path: FieldPath = "trail[].x".parse().unwrap();
        for i in 0..3u32 {
            view.set_path(&path, &[i], i as f32 * 10.0);
        }
        let trail = view.get("trail").into_array();
        assert_eq!(trail.get(1).into_struct().value("x"), Value::Float(10.0));
        assert_eq!(view.get_path(&path, &[2]).into_value(), Value::Float(20.0));
    }

    #[test]
    #[should_panic(expected = "has no field 'nope'")]
    fn unknown_field_panics() {
        let view: StructView = StructView::new(acc(), Address(64), body());
        view.get("nope");
    }

    #[test]
    #[should_panic(expected = "laid out for")]
    fn width_mismatch_panics() {
        let wide = DescriptorBuilder::new("W", AddressWidth::W64)
            .scalar("a", TypeTag::U8)
            .build()
            .unwrap();
        let _: StructView = StructView::new(acc(), Address(64), wide);
    }

    #[test]
    fn alloc_zeroes_and_free_detaches() {
        let acc = acc();
        let heap = HeapAllocator::new(Arc::clone(acc.memory()));
        acc.fill(Address(8), 0xFF, 256);
        let view: StructView = StructView::alloc(&acc, &heap, &body()).unwrap();
        assert!(view.to_bytes().iter().all(|&b| b == 0));
        let handle = view.clone();
        view.free(&heap);
        assert!(handle.is_detached());
        assert_eq!(heap.live_allocations(), 0);
    }

    #[cfg(any(debug_assertions, feature = "checked"))]
    #[test]
    #[should_panic(expected = "detached view")]
    fn access_after_detach_panics() {
        let view: StructView = StructView::new(acc(), Address(64), body());
        let pos = view.get("pos").into_struct();
        view.detach();
        pos.value("x");
    }

    #[test]
    fn detach_handle_reaches_cached_children() {
        let view: StructView = StructView::new(acc(), Address(64), body());
        let pos = view.get("pos").into_struct();
        let trail = view.get("trail").into_array();
        let handle = view.detach_handle();
        assert!(!pos.is_detached());
        handle.detach();
        assert!(view.is_detached());
        assert!(pos.is_detached());
        assert!(trail.is_detached());
        drop((view, pos, trail));
        assert!(handle.is_dropped());
    }

    #[test]
    fn alloc_reports_exhaustion() {
        let acc = MemoryAccessor::new(
            LinearMemory::shared(MemoryConfig::new(AddressWidth::W32).with_pages(1, 1)).unwrap(),
        );
        let heap = HeapAllocator::new(Arc::clone(acc.memory()));
        let huge = DescriptorBuilder::new("Huge", AddressWidth::W32)
            .array("bytes", TypeTag::U8, 70_000)
            .build()
            .unwrap();
        let err = StructView::<OnDemand>::alloc(&acc, &heap, &huge).unwrap_err();
        assert_eq!(err, AllocError::Exhausted { requested: 70_000 });
    }
}
