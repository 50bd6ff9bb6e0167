//! Where a view's bytes are, and whether it may still be used.
//!
//! Every view owns an [`Anchor`]. A root view's anchor holds a fixed
//! address; a child's anchor points at its parent's anchor plus an offset,
//! so repositioning or detaching a parent is seen by the whole subtree
//! without walking it. Pointer-dereference children re-read the pointer on
//! every access.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use linmem_core::Address;
use linmem_memory::MemoryAccessor;

use crate::CHECKED;

pub(crate) enum Origin {
    Fixed(Address),
    /// `parent + offset`.
    Nested { parent: Rc<Anchor>, offset: u32 },
    /// The address stored in the pointer at `parent + offset`.
    Deref { parent: Rc<Anchor>, offset: u32 },
}

impl Origin {
    fn parent(&self) -> Option<&Rc<Anchor>> {
        match self {
            Origin::Fixed(_) => None,
            Origin::Nested { parent, .. } | Origin::Deref { parent, .. } => Some(parent),
        }
    }
}

pub(crate) struct Anchor {
    origin: RefCell<Origin>,
    detached: Cell<bool>,
}

impl Anchor {
    pub(crate) fn fixed(address: Address) -> Rc<Self> {
        Self::with_origin(Origin::Fixed(address))
    }

    pub(crate) fn nested(parent: &Rc<Anchor>, offset: u32) -> Rc<Self> {
        Self::with_origin(Origin::Nested {
            parent: Rc::clone(parent),
            offset,
        })
    }

    pub(crate) fn deref(parent: &Rc<Anchor>, offset: u32) -> Rc<Self> {
        Self::with_origin(Origin::Deref {
            parent: Rc::clone(parent),
            offset,
        })
    }

    fn with_origin(origin: Origin) -> Rc<Self> {
        Rc::new(Self {
            origin: RefCell::new(origin),
            detached: Cell::new(false),
        })
    }

    /// Current effective address.
    pub(crate) fn address(&self, acc: &MemoryAccessor) -> Address {
        match &*self.origin.borrow() {
            Origin::Fixed(address) => *address,
            Origin::Nested { parent, offset } => parent.address(acc).offset(*offset as u64),
            Origin::Deref { parent, offset } => {
                let target = acc.read_address(parent.address(acc).offset(*offset as u64));
                if CHECKED {
                    assert!(!target.is_null(), "dereference of a null pointer field");
                }
                target
            }
        }
    }

    pub(crate) fn reposition(&self, address: Address) {
        *self.origin.borrow_mut() = Origin::Fixed(address);
    }

    /// Re-link a cached child to `parent + offset` if something moved it.
    pub(crate) fn revalidate(&self, parent: &Rc<Anchor>, offset: u32, deref: bool) {
        let ok = match &*self.origin.borrow() {
            Origin::Nested { parent: p, offset: o } => {
                !deref && Rc::ptr_eq(p, parent) && *o == offset
            }
            Origin::Deref { parent: p, offset: o } => {
                deref && Rc::ptr_eq(p, parent) && *o == offset
            }
            Origin::Fixed(_) => false,
        };
        if !ok {
            let parent = Rc::clone(parent);
            *self.origin.borrow_mut() = if deref {
                Origin::Deref { parent, offset }
            } else {
                Origin::Nested { parent, offset }
            };
        }
    }

    pub(crate) fn detach(&self) {
        self.detached.set(true);
    }

    /// Detached directly or through any ancestor.
    pub(crate) fn is_detached(&self) -> bool {
        self.detached.get() || self.origin.borrow().parent().is_some_and(|p| p.is_detached())
    }

    #[inline]
    pub(crate) fn check_live(&self) {
        if CHECKED {
            assert!(!self.is_detached(), "access through a detached view");
        }
    }
}

/// Lets the owner of a view's memory detach the view without keeping it
/// alive.
///
/// Obtained from [`StructView::detach_handle`](crate::StructView::detach_handle).
/// Holds the view's anchor weakly, so once every clone of the view is gone
/// the handle does nothing.
#[derive(Clone)]
pub struct DetachHandle {
    anchor: Weak<Anchor>,
}

impl DetachHandle {
    pub(crate) fn new(anchor: &Rc<Anchor>) -> Self {
        Self {
            anchor: Rc::downgrade(anchor),
        }
    }

    /// Detach the view and its descendants, if it still exists.
    pub fn detach(&self) {
        if let Some(anchor) = self.anchor.upgrade() {
            anchor.detach();
        }
    }

    /// Whether every clone of the view has been dropped.
    pub fn is_dropped(&self) -> bool {
        self.anchor.strong_count() == 0
    }
}

impl std::fmt::Debug for DetachHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetachHandle")
            .field("dropped", &self.is_dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linmem_core::AddressWidth;
    use linmem_memory::{LinearMemory, MemoryConfig};

    fn acc() -> MemoryAccessor {
        MemoryAccessor::new(LinearMemory::shared(MemoryConfig::new(AddressWidth::W32)).unwrap())
    }

    #[test]
    fn nested_follows_parent() {
        let acc = acc();
        let root = Anchor::fixed(Address(100));
        let child = Anchor::nested(&root, 8);
        let grandchild = Anchor::nested(&child, 4);
        assert_eq!(grandchild.address(&acc), Address(112));
        root.reposition(Address(200));
        assert_eq!(grandchild.address(&acc), Address(212));
    }

    #[test]
    fn deref_rereads_pointer() {
        let acc = acc();
        let root = Anchor::fixed(Address(64));
        let target = Anchor::deref(&root, 4);
        acc.write_address(Address(68), Address(1000));
        assert_eq!(target.address(&acc), Address(1000));
        acc.write_address(Address(68), Address(2000));
        assert_eq!(target.address(&acc), Address(2000));
    }

    #[test]
    fn detach_propagates_down_not_up() {
        let root = Anchor::fixed(Address(8));
        let child = Anchor::nested(&root, 0);
        child.detach();
        assert!(!root.is_detached());
        let other = Anchor::nested(&root, 4);
        root.detach();
        assert!(other.is_detached());
    }

    #[test]
    fn detach_handle_is_weak() {
        let root = Anchor::fixed(Address(8));
        let child = Anchor::nested(&root, 0);
        let handle = DetachHandle::new(&root);
        handle.detach();
        assert!(child.is_detached());
        drop((root, child));
        assert!(handle.is_dropped());
        handle.detach();
    }

    #[test]
    fn revalidate_relinks_moved_child() {
        let acc = acc();
        let root = Anchor::fixed(Address(40));
        let child = Anchor::nested(&root, 8);
        child.reposition(Address(500));
        child.revalidate(&root, 8, false);
        assert_eq!(child.address(&acc), Address(48));
    }
}
