//! Benchmark profiles for the linmem workspace.
//!
//! - [`bench_region`]: a region sized for the benches, with a heap over it
//! - [`churn_sizes`]: a deterministic mix of allocation sizes

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use linmem_core::AddressWidth;
use linmem_memory::{HeapAllocator, LinearMemory, MemoryAccessor, MemoryConfig};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Seed for [`churn_sizes`].
pub const CHURN_SEED: u64 = 0x9E37_79B9;

/// A 16-page region (growable to 256) with an accessor and heap.
pub fn bench_region(width: AddressWidth) -> (MemoryAccessor, Arc<HeapAllocator>) {
    let memory = LinearMemory::shared(MemoryConfig::new(width).with_pages(16, 256))
        .expect("bench region config is valid");
    let heap = Arc::new(HeapAllocator::new(Arc::clone(&memory)));
    (MemoryAccessor::new(memory), heap)
}

/// `n` run lengths in `1..=max` from a ChaCha8 stream seeded with
/// [`CHURN_SEED`], so every run sees the same sequence.
///
/// # Panics
///
/// Panics if `max` is zero.
pub fn churn_sizes(n: usize, max: u32) -> Vec<u32> {
    assert!(max > 0, "churn sizes need a nonzero maximum");
    let mut rng = ChaCha8Rng::seed_from_u64(CHURN_SEED);
    (0..n).map(|_| rng.random_range(1..=max)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn churn_sizes_are_in_range_and_repeatable() {
        let a = churn_sizes(100, 8);
        assert!(a.iter().all(|&n| (1..=8).contains(&n)));
        assert_eq!(a, churn_sizes(100, 8));
    }

    #[test]
    fn churn_sizes_cover_the_range() {
        let a = churn_sizes(1000, 4);
        for size in 1..=4 {
            assert!(a.contains(&size), "size {size} never drawn");
        }
    }
}
