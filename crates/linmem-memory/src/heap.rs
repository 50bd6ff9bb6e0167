//! Raw `malloc`/`free` over a linear memory region.
//!
//! [`RawAllocator`] is the interface the view and shared-pointer layers
//! allocate through. [`HeapAllocator`] is a first-fit implementation with
//! eager coalescing: free space is kept as a map of disjoint ranges ordered
//! by address, allocation takes the lowest range that fits, and freeing
//! merges with both neighbours so no two free ranges ever touch.

use std::collections::BTreeMap;

use linmem_core::Address;
use parking_lot::Mutex;

use crate::config::PAGE_SIZE;
use crate::region::SharedMemory;

/// Alignment and size granularity of every heap allocation.
pub const HEAP_ALIGN: u64 = 8;

/// Raw allocation primitive over a region.
///
/// Implementations are shared by every agent mapping the region, so they
/// must be thread-safe.
pub trait RawAllocator: Send + Sync {
    /// Allocate `size` bytes. Returns [`Address::NULL`] on failure; a live
    /// allocation is never at address 0.
    fn malloc(&self, size: u64) -> Address;

    /// Release an allocation made by [`malloc`](Self::malloc). Freeing
    /// [`Address::NULL`] does nothing.
    fn free(&self, address: Address);
}

struct HeapState {
    /// Free ranges: start → length. Disjoint and never adjacent.
    free: BTreeMap<u64, u64>,
    /// Live allocations: start → length.
    live: BTreeMap<u64, u64>,
}

impl HeapState {
    fn first_fit(&self, size: u64) -> Option<(u64, u64)> {
        self.free
            .iter()
            .find(|(_, &len)| len >= size)
            .map(|(&start, &len)| (start, len))
    }

    /// Insert a free range and merge it with touching neighbours.
    fn release(&mut self, start: u64, len: u64) {
        let mut start = start;
        let mut len = len;
        if let Some((&prev_start, &prev_len)) = self.free.range(..start).next_back() {
            if prev_start + prev_len == start {
                self.free.remove(&prev_start);
                start = prev_start;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free.remove(&(start + len)) {
            len += next_len;
        }
        self.free.insert(start, len);
    }

    /// Length of the free range ending exactly at `end`, if any.
    fn trailing_free(&self, end: u64) -> u64 {
        match self.free.iter().next_back() {
            Some((&start, &len)) if start + len == end => len,
            _ => 0,
        }
    }
}

/// First-fit, coalescing heap over a [`LinearMemory`](crate::LinearMemory).
///
/// The first `reserved_low` bytes of the region are never handed out.
/// When no free range fits, the region is grown by just enough pages
/// (counting a free range already touching the end); if the region is at
/// its maximum, `malloc` returns null.
pub struct HeapAllocator {
    memory: SharedMemory,
    state: Mutex<HeapState>,
}

impl HeapAllocator {
    /// Manage the region from `reserved_low` to its current end.
    pub fn new(memory: SharedMemory) -> Self {
        let low = memory.config().reserved_low as u64;
        let end = memory.len() as u64;
        let mut free = BTreeMap::new();
        if end > low {
            free.insert(low, end - low);
        }
        Self {
            memory,
            state: Mutex::new(HeapState {
                free,
                live: BTreeMap::new(),
            }),
        }
    }

    /// The managed region.
    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    /// Bytes currently allocated (after rounding).
    pub fn live_bytes(&self) -> u64 {
        self.state.lock().live.values().sum()
    }

    /// Number of live allocations.
    pub fn live_allocations(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Bytes in free ranges.
    pub fn free_bytes(&self) -> u64 {
        self.state.lock().free.values().sum()
    }

    /// Number of disjoint free ranges.
    pub fn free_ranges(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Size of the live allocation starting at `address`.
    pub fn allocation_size(&self, address: Address) -> Option<u64> {
        self.state.lock().live.get(&address.get()).copied()
    }

    /// Grow the region so a range of `size` bytes fits at its end.
    ///
    /// Other holders of the region may grow it concurrently, so the range
    /// claimed is the one this call's grow returned, not the length read
    /// beforehand.
    fn grow_for(&self, state: &mut HeapState, size: u64) -> bool {
        let end = self.memory.len() as u64;
        let have = state.trailing_free(end);
        let need = size - have;
        let pages = need.div_ceil(PAGE_SIZE as u64);
        let Ok(pages) = u32::try_from(pages) else {
            return false;
        };
        match self.memory.grow(pages) {
            Ok(previous) => {
                let start = previous as u64 * PAGE_SIZE as u64;
                if start != end {
                    tracing::debug!(expected = end, actual = start, "region grew underneath heap");
                }
                state.release(start, pages as u64 * PAGE_SIZE as u64);
                true
            }
            Err(err) => {
                tracing::debug!(size, %err, "heap cannot grow");
                false
            }
        }
    }
}

impl RawAllocator for HeapAllocator {
    fn malloc(&self, size: u64) -> Address {
        // Zero-byte requests still get a distinct, non-null allocation.
        let Some(rounded) = size.max(1).checked_next_multiple_of(HEAP_ALIGN) else {
            return Address::NULL;
        };
        let mut state = self.state.lock();
        let mut found = state.first_fit(rounded);
        // A grow interleaved with someone else's may leave the new range
        // short of contiguous; grow again until it fits or the region is full.
        while found.is_none() && self.grow_for(&mut state, rounded) {
            found = state.first_fit(rounded);
        }
        let Some((start, len)) = found else {
            tracing::trace!(size, "heap exhausted");
            return Address::NULL;
        };
        state.free.remove(&start);
        if len > rounded {
            state.free.insert(start + rounded, len - rounded);
        }
        state.live.insert(start, rounded);
        tracing::trace!(address = start, size = rounded, "heap malloc");
        Address(start)
    }

    fn free(&self, address: Address) {
        if address.is_null() {
            return;
        }
        let mut state = self.state.lock();
        let Some(len) = state.live.remove(&address.get()) else {
            panic!("free of {address}, which is not a live heap allocation");
        };
        state.release(address.get(), len);
        tracing::trace!(address = address.get(), size = len, "heap free");
    }
}

impl<A: RawAllocator + ?Sized> RawAllocator for std::sync::Arc<A> {
    fn malloc(&self, size: u64) -> Address {
        (**self).malloc(size)
    }

    fn free(&self, address: Address) {
        (**self).free(address)
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<HeapAllocator>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::region::LinearMemory;

    fn heap(initial: u32, max: u32) -> HeapAllocator {
        let mem = LinearMemory::shared(MemoryConfig::default().with_pages(initial, max)).unwrap();
        HeapAllocator::new(mem)
    }

    #[test]
    fn first_allocation_skips_reserved_low() {
        let h = heap(1, 1);
        assert_eq!(h.malloc(4), Address(8));
        assert_eq!(h.malloc(4), Address(16));
        assert_eq!(h.allocation_size(Address(8)), Some(8));
    }

    #[test]
    fn first_fit_reuses_lowest_hole() {
        let h = heap(1, 1);
        let a = h.malloc(16);
        let b = h.malloc(16);
        let c = h.malloc(16);
        h.free(a);
        h.free(c);
        // Hole at `a` is lower than the space after `c`.
        assert_eq!(h.malloc(8), a);
        assert_ne!(h.malloc(16), b);
    }

    #[test]
    fn free_coalesces_both_sides() {
        let h = heap(1, 1);
        let a = h.malloc(16);
        let b = h.malloc(16);
        let c = h.malloc(16);
        let _guard = h.malloc(16);
        h.free(a);
        h.free(c);
        assert_eq!(h.free_ranges(), 3);
        h.free(b);
        assert_eq!(h.free_ranges(), 2);
        assert_eq!(h.malloc(48), a);
    }

    #[test]
    fn grows_region_when_full() {
        let h = heap(1, 4);
        let big = h.malloc(PAGE_SIZE as u64);
        assert!(!big.is_null());
        assert_eq!(h.memory().pages(), 2);
    }

    #[test]
    fn externally_grown_pages_are_never_handed_out() {
        let h = heap(1, 8);
        let foreign = h.memory().grow(1).unwrap() as u64 * PAGE_SIZE as u64;
        let foreign_end = foreign + PAGE_SIZE as u64;
        let mut got = Vec::new();
        for _ in 0..4 {
            let a = h.malloc(PAGE_SIZE as u64 / 2);
            assert!(!a.is_null());
            got.push((a.get(), h.allocation_size(a).unwrap()));
        }
        for (start, len) in got {
            assert!(start + len <= foreign || start >= foreign_end);
        }
        assert_eq!(h.memory().pages(), 4);
    }

    #[test]
    fn returns_null_when_exhausted() {
        let h = heap(1, 1);
        assert!(h.malloc(PAGE_SIZE as u64).is_null());
        assert_eq!(h.live_allocations(), 0);
    }

    #[test]
    fn zero_size_gets_distinct_addresses() {
        let h = heap(1, 1);
        let a = h.malloc(0);
        let b = h.malloc(0);
        assert!(!a.is_null() && !b.is_null());
        assert_ne!(a, b);
    }

    #[test]
    fn free_null_is_noop() {
        let h = heap(1, 1);
        h.free(Address::NULL);
    }

    #[test]
    #[should_panic(expected = "not a live heap allocation")]
    fn double_free_panics() {
        let h = heap(1, 1);
        let a = h.malloc(8);
        h.free(a);
        h.free(a);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn live_ranges_never_overlap(
                ops in proptest::collection::vec((any::<bool>(), 1u64..4096), 1..64),
            ) {
                let h = heap(1, 8);
                let mut live: Vec<(u64, u64)> = Vec::new();
                for (is_alloc, size) in ops {
                    if is_alloc || live.is_empty() {
                        let a = h.malloc(size);
                        prop_assert!(!a.is_null());
                        let len = h.allocation_size(a).unwrap();
                        prop_assert!(len >= size);
                        prop_assert_eq!(a.get() % HEAP_ALIGN, 0);
                        for &(s, l) in &live {
                            prop_assert!(a.get() + len <= s || s + l <= a.get());
                        }
                        live.push((a.get(), len));
                    } else {
                        let idx = (size as usize) % live.len();
                        let (s, _) = live.swap_remove(idx);
                        h.free(Address(s));
                    }
                }
                for (s, _) in live.drain(..) {
                    h.free(Address(s));
                }
                // Everything coalesces back into one range.
                prop_assert_eq!(h.free_ranges(), 1);
                prop_assert_eq!(h.live_bytes(), 0);
            }
        }
    }
}
