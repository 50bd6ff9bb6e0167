//! The reference-count control block.
//!
//! ```text
//! offset 0   u32  strong count (atomic)
//! offset 4        padding
//! offset 8   addr payload address (4 or 8 bytes, region width)
//! size 16, align 8
//! ```
//!
//! The count is only ever touched through the accessor's atomics, so agents
//! on different threads can share a block without locking.

use linmem_core::Address;
use linmem_memory::{MemoryAccessor, RawAllocator};

use crate::error::ShareError;
use crate::registry::Destructor;

/// Bytes in a control block.
pub const BLOCK_SIZE: u64 = 16;
/// Offset of the strong count.
pub const COUNT_OFFSET: u64 = 0;
/// Offset of the payload address.
pub const PAYLOAD_OFFSET: u64 = 8;

/// Allocate a block for `payload` with a strong count of one.
pub(crate) fn create(
    acc: &MemoryAccessor,
    allocator: &dyn RawAllocator,
    payload: Address,
) -> Result<Address, ShareError> {
    let block = allocator.malloc(BLOCK_SIZE);
    if block.is_null() {
        return Err(ShareError::Exhausted {
            requested: BLOCK_SIZE,
        });
    }
    acc.write_address(block.offset(PAYLOAD_OFFSET), payload);
    acc.atomic_store_u32(block.offset(COUNT_OFFSET), 1);
    Ok(block)
}

/// Current strong count.
pub(crate) fn count(acc: &MemoryAccessor, block: Address) -> u32 {
    acc.atomic_load_u32(block.offset(COUNT_OFFSET))
}

/// Payload address stored in the block.
pub(crate) fn payload(acc: &MemoryAccessor, block: Address) -> Address {
    acc.read_address(block.offset(PAYLOAD_OFFSET))
}

/// Take one more share, returning the new count.
///
/// # Panics
///
/// Panics if the count is already zero (the block has been released) or
/// would overflow.
pub(crate) fn acquire(acc: &MemoryAccessor, block: Address) -> u32 {
    let at = block.offset(COUNT_OFFSET);
    let mut current = acc.atomic_load_u32(at);
    loop {
        assert!(current != 0, "block {block} was already released");
        let next = match current.checked_add(1) {
            Some(next) => next,
            None => panic!("reference count of block {block} overflowed"),
        };
        match acc.compare_exchange_u32(at, current, next) {
            Ok(_) => return next,
            Err(actual) => current = actual,
        }
    }
}

/// Drop one share. The caller that takes the count from one to zero frees
/// the payload (through `destructor`, or the raw allocator without one) and
/// then the block. Returns whether this call released.
pub(crate) fn release(
    acc: &MemoryAccessor,
    allocator: &dyn RawAllocator,
    block: Address,
    destructor: Option<&Destructor>,
) -> bool {
    let prev = acc.fetch_sub_u32(block.offset(COUNT_OFFSET), 1);
    assert!(prev != 0, "block {block} released more times than acquired");
    if prev != 1 {
        return false;
    }
    let payload = payload(acc, block);
    match destructor {
        Some(destructor) => destructor(payload),
        None => allocator.free(payload),
    }
    allocator.free(block);
    tracing::trace!(%block, %payload, "released shared block");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use linmem_core::AddressWidth;
    use linmem_memory::{HeapAllocator, LinearMemory, MemoryConfig};

    fn setup(width: AddressWidth) -> (MemoryAccessor, HeapAllocator) {
        let mem = LinearMemory::shared(MemoryConfig::new(width)).unwrap();
        (MemoryAccessor::new(mem.clone()), HeapAllocator::new(mem))
    }

    #[test]
    fn layout_at_both_widths() {
        for width in [AddressWidth::W32, AddressWidth::W64] {
            let (acc, heap) = setup(width);
            let data = heap.malloc(24);
            let block = create(&acc, &heap, data).unwrap();
            assert_eq!(block.get() % 8, 0);
            assert_eq!(acc.read_u32(block), 1);
            assert_eq!(payload(&acc, block), data);
            assert_eq!(heap.allocation_size(block), Some(BLOCK_SIZE));
        }
    }

    #[test]
    fn last_release_frees_both() {
        let (acc, heap) = setup(AddressWidth::W32);
        let block = create(&acc, &heap, heap.malloc(8)).unwrap();
        assert_eq!(acquire(&acc, block), 2);
        assert!(!release(&acc, &heap, block, None));
        assert_eq!(heap.live_allocations(), 2);
        assert!(release(&acc, &heap, block, None));
        assert_eq!(heap.live_allocations(), 0);
    }

    #[test]
    #[should_panic(expected = "already released")]
    fn acquire_after_release_panics() {
        let (acc, heap) = setup(AddressWidth::W32);
        let block = create(&acc, &heap, heap.malloc(8)).unwrap();
        acc.atomic_store_u32(block, 0);
        acquire(&acc, block);
    }

    #[test]
    #[should_panic(expected = "overflowed")]
    fn acquire_overflow_panics() {
        let (acc, heap) = setup(AddressWidth::W32);
        let block = create(&acc, &heap, heap.malloc(8)).unwrap();
        acc.atomic_store_u32(block, u32::MAX);
        acquire(&acc, block);
    }
}
