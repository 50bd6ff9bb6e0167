//! Test utilities and fixtures for linmem development.
//!
//! Provides region setup helpers, allocator wrappers that fail or record
//! on demand ([`FailingAllocator`], [`TrackingAllocator`]), a
//! [`CountingDestructor`] for shared-pointer release tests, and a set of
//! sample descriptors in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use linmem_core::{Address, AddressWidth};
use linmem_memory::{
    HeapAllocator, LinearMemory, MemoryAccessor, MemoryConfig, RawAllocator, SharedMemory,
};
use parking_lot::Mutex;

/// A fresh region of `pages` pages that may grow to `max_pages`.
pub fn region(width: AddressWidth, pages: u32, max_pages: u32) -> SharedMemory {
    LinearMemory::shared(MemoryConfig::new(width).with_pages(pages, max_pages))
        .expect("test region config is valid")
}

/// A one-page region (growable to 16) with an accessor and heap over it.
pub fn heap_region(width: AddressWidth) -> (MemoryAccessor, Arc<HeapAllocator>) {
    let mem = region(width, 1, 16);
    let heap = Arc::new(HeapAllocator::new(Arc::clone(&mem)));
    (MemoryAccessor::new(mem), heap)
}

/// Delegates to an inner allocator until `budget` mallocs have succeeded,
/// then returns null.
pub struct FailingAllocator<A> {
    inner: A,
    remaining: AtomicUsize,
}

impl<A: RawAllocator> FailingAllocator<A> {
    pub fn new(inner: A, budget: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(budget),
        }
    }

    /// An allocator that fails every request.
    pub fn always(inner: A) -> Self {
        Self::new(inner, 0)
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: RawAllocator> RawAllocator for FailingAllocator<A> {
    fn malloc(&self, size: u64) -> Address {
        let granted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if granted {
            self.inner.malloc(size)
        } else {
            Address::NULL
        }
    }

    fn free(&self, address: Address) {
        self.inner.free(address);
    }
}

/// Delegates to an inner allocator and records which addresses are live.
pub struct TrackingAllocator<A> {
    inner: A,
    live: Mutex<BTreeSet<Address>>,
    mallocs: AtomicUsize,
    frees: AtomicUsize,
}

impl<A: RawAllocator> TrackingAllocator<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            live: Mutex::new(BTreeSet::new()),
            mallocs: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
        }
    }

    pub fn mallocs(&self) -> usize {
        self.mallocs.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    /// Addresses handed out and not yet freed.
    pub fn live(&self) -> Vec<Address> {
        self.live.lock().iter().copied().collect()
    }
}

impl<A: RawAllocator> RawAllocator for TrackingAllocator<A> {
    fn malloc(&self, size: u64) -> Address {
        let address = self.inner.malloc(size);
        if !address.is_null() {
            self.mallocs.fetch_add(1, Ordering::SeqCst);
            self.live.lock().insert(address);
        }
        address
    }

    fn free(&self, address: Address) {
        if address.is_null() {
            return;
        }
        assert!(
            self.live.lock().remove(&address),
            "free of {address}, which is not live"
        );
        self.frees.fetch_add(1, Ordering::SeqCst);
        self.inner.free(address);
    }
}

/// Destructor that frees through an allocator and counts its runs.
#[derive(Clone)]
pub struct CountingDestructor {
    allocator: Arc<dyn RawAllocator>,
    released: Arc<Mutex<Vec<Address>>>,
}

impl CountingDestructor {
    pub fn new(allocator: Arc<dyn RawAllocator>) -> Self {
        Self {
            allocator,
            released: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A destructor closure sharing this counter.
    pub fn destructor(&self) -> Arc<dyn Fn(Address) + Send + Sync> {
        let allocator = Arc::clone(&self.allocator);
        let released = Arc::clone(&self.released);
        Arc::new(move |payload: Address| {
            released.lock().push(payload);
            allocator.free(payload);
        })
    }

    pub fn runs(&self) -> usize {
        self.released.lock().len()
    }

    /// Payload addresses released so far, in order.
    pub fn released(&self) -> Vec<Address> {
        self.released.lock().clone()
    }
}
