//! Per-agent context for shared pointers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use linmem_core::{Address, TypeDescriptor};
use linmem_memory::{MemoryAccessor, RawAllocator, SharedMemory};

use crate::block;
use crate::error::ShareError;
use crate::pointer::SharedPtr;
use crate::registry::{Destructor, DestructorRegistry};
use crate::transfer::Transferable;

pub(crate) struct AgentInner {
    pub(crate) acc: MemoryAccessor,
    pub(crate) allocator: Arc<dyn RawAllocator>,
    pub(crate) registry: RefCell<DestructorRegistry>,
}

/// One agent's view of a shared region.
///
/// Holds the region, the raw allocator every agent shares, and this agent's
/// [`DestructorRegistry`]. An `Agent` and its pointers stay on the thread
/// that built them; another thread maps the same region by building its own
/// `Agent` and receives pointers through [`Transferable`].
#[derive(Clone)]
pub struct Agent {
    inner: Rc<AgentInner>,
}

impl Agent {
    /// Attach to `memory`, allocating through `allocator`.
    pub fn new(memory: SharedMemory, allocator: Arc<dyn RawAllocator>) -> Self {
        Self {
            inner: Rc::new(AgentInner {
                acc: MemoryAccessor::new(memory),
                allocator,
                registry: RefCell::new(DestructorRegistry::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<AgentInner>) -> Self {
        Self { inner }
    }

    /// Accessor over the agent's region.
    pub fn accessor(&self) -> &MemoryAccessor {
        &self.inner.acc
    }

    /// The shared raw allocator.
    pub fn allocator(&self) -> &Arc<dyn RawAllocator> {
        &self.inner.allocator
    }

    /// Share `payload`, which the new pointer now owns.
    ///
    /// On release the payload goes to `destructor`, or to the raw
    /// allocator's `free` if there is none. If the control block cannot be
    /// allocated, the payload is left untouched and stays the caller's.
    ///
    /// # Panics
    ///
    /// Panics if `payload` is null.
    pub fn make(
        &self,
        payload: Address,
        destructor: Option<Destructor>,
    ) -> Result<SharedPtr, ShareError> {
        assert!(!payload.is_null(), "cannot share the null address");
        let block = block::create(&self.inner.acc, &*self.inner.allocator, payload)?;
        Ok(self.adopt(block, destructor))
    }

    /// Allocate a zeroed instance of `desc` and share it.
    ///
    /// # Panics
    ///
    /// Panics if `desc` was laid out for a different address width.
    pub fn make_struct(
        &self,
        desc: &Arc<TypeDescriptor>,
        destructor: Option<Destructor>,
    ) -> Result<SharedPtr, ShareError> {
        assert_eq!(
            desc.width(),
            self.inner.acc.width(),
            "descriptor '{}' does not match the region's address width",
            desc.name()
        );
        let size = desc.size() as u64;
        let payload = self.inner.allocator.malloc(size);
        if payload.is_null() {
            return Err(ShareError::Exhausted { requested: size });
        }
        self.inner.acc.fill(payload, 0, size as usize);
        match self.make(payload, destructor) {
            Ok(ptr) => Ok(ptr),
            Err(e) => {
                self.inner.allocator.free(payload);
                Err(e)
            }
        }
    }

    /// Take delivery of a transfer. The share it carries becomes the new
    /// pointer's; the count is not incremented again.
    ///
    /// Uses `destructor` if given, else the sender's.
    ///
    /// # Panics
    ///
    /// Panics if the transfer came from a different region.
    pub fn from_transferable(
        &self,
        transfer: Transferable,
        destructor: Option<Destructor>,
    ) -> SharedPtr {
        let (block, sender) = transfer.deliver(&self.inner.acc);
        self.adopt(block, destructor.or(sender))
    }

    /// Adopt raw transfer bytes produced by
    /// [`Transferable::into_bytes`].
    ///
    /// The bytes carry exactly one share; adopting them twice, or never,
    /// breaks the count.
    pub fn from_bytes(
        &self,
        bytes: &[u8],
        destructor: Option<Destructor>,
    ) -> Result<SharedPtr, ShareError> {
        let width = self.inner.acc.width();
        let block = match width.decode(bytes) {
            Some(block) => block,
            None => {
                return Err(ShareError::InvalidTransfer {
                    expected: width.bytes() as usize,
                    found: bytes.len(),
                })
            }
        };
        if block.is_null() {
            return Err(ShareError::NullTransfer);
        }
        Ok(self.adopt(block, destructor))
    }

    /// Wrap a block whose share the caller already holds.
    fn adopt(&self, block: Address, destructor: Option<Destructor>) -> SharedPtr {
        assert!(
            block::count(&self.inner.acc, block) != 0,
            "block {block} was already released"
        );
        self.inner.registry.borrow_mut().track(block, destructor);
        SharedPtr::from_parts(Rc::clone(&self.inner), block)
    }

    /// This agent's live handles to `block`.
    pub fn local_handles(&self, block: Address) -> u32 {
        self.inner.registry.borrow().local_handles(block)
    }

    /// Blocks this agent holds at least one handle to.
    pub fn tracked_blocks(&self) -> usize {
        self.inner.registry.borrow().len()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("width", &self.inner.acc.width())
            .field("registry", &*self.inner.registry.borrow())
            .finish()
    }
}
