//! Moving a share between agents.

use std::fmt;
use std::sync::Arc;

use linmem_core::Address;
use linmem_memory::{MemoryAccessor, RawAllocator};

use crate::block;
use crate::registry::Destructor;

/// Everything needed to give an undelivered share back.
struct Reclaim {
    acc: MemoryAccessor,
    allocator: Arc<dyn RawAllocator>,
    destructor: Option<Destructor>,
}

/// One share of a block, in flight between agents.
///
/// The bytes are the control block address, little-endian, at the region's
/// address width. A `Transferable` owns its share: if it is dropped before
/// delivery (on any thread) the share is given back, releasing the payload
/// if it was the last.
pub struct Transferable {
    bytes: Vec<u8>,
    block: Address,
    reclaim: Option<Reclaim>,
}

impl Transferable {
    pub(crate) fn new(
        acc: MemoryAccessor,
        allocator: Arc<dyn RawAllocator>,
        block: Address,
        destructor: Option<Destructor>,
    ) -> Self {
        Self {
            bytes: acc.width().encode(block),
            block,
            reclaim: Some(Reclaim {
                acc,
                allocator,
                destructor,
            }),
        }
    }

    /// The serialized address.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The control block being transferred.
    pub fn block(&self) -> Address {
        self.block
    }

    /// Hand out the raw bytes, giving up automatic reclamation. Whoever
    /// ends up with the bytes must pass them to
    /// [`Agent::from_bytes`](crate::Agent::from_bytes) exactly once.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.reclaim = None;
        std::mem::take(&mut self.bytes)
    }

    /// Disarm and return the block plus the sender's destructor.
    pub(crate) fn deliver(mut self, acc: &MemoryAccessor) -> (Address, Option<Destructor>) {
        let reclaim = self.reclaim.take();
        let destructor = match reclaim {
            Some(r) => {
                assert!(
                    r.acc.same_region(acc),
                    "transfer of block {} belongs to a different region",
                    self.block
                );
                r.destructor
            }
            None => None,
        };
        (self.block, destructor)
    }
}

impl Drop for Transferable {
    fn drop(&mut self) {
        if let Some(r) = self.reclaim.take() {
            let released =
                block::release(&r.acc, &*r.allocator, self.block, r.destructor.as_ref());
            tracing::debug!(block = %self.block, released, "reclaimed undelivered transfer");
        }
    }
}

impl fmt::Debug for Transferable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transferable")
            .field("block", &self.block)
            .field("armed", &self.reclaim.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::error::ShareError;
    use linmem_core::AddressWidth;
    use linmem_memory::{HeapAllocator, LinearMemory, MemoryConfig};

    fn agent(width: AddressWidth) -> (Agent, Arc<HeapAllocator>) {
        let mem = LinearMemory::shared(MemoryConfig::new(width)).unwrap();
        let heap = Arc::new(HeapAllocator::new(mem.clone()));
        (Agent::new(mem, heap.clone()), heap)
    }

    #[test]
    fn round_trip_within_agent() {
        let (agent, heap) = agent(AddressWidth::W64);
        let payload = heap.malloc(16);
        let p = agent.make(payload, None).unwrap();
        let before = p.use_count();
        let t = p.to_transferable();
        assert_eq!(t.as_bytes().len(), 8);
        let q = agent.from_transferable(t, None);
        assert_eq!(q.get(), payload);
        assert_eq!(q.use_count(), before + 1);
    }

    #[test]
    fn undelivered_transfer_is_reclaimed() {
        let (agent, heap) = agent(AddressWidth::W32);
        let p = agent.make(heap.malloc(16), None).unwrap();
        let t = p.to_transferable();
        drop(p);
        assert_eq!(heap.live_allocations(), 2);
        drop(t);
        assert_eq!(heap.live_allocations(), 0);
    }

    #[test]
    fn raw_bytes_carry_one_share() {
        let (agent, heap) = agent(AddressWidth::W32);
        let p = agent.make(heap.malloc(16), None).unwrap();
        let bytes = p.to_transferable().into_bytes();
        assert_eq!(p.use_count(), 2);
        let q = agent.from_bytes(&bytes, None).unwrap();
        assert_eq!(q.use_count(), 2);
        drop(p);
        drop(q);
        assert_eq!(heap.live_allocations(), 0);
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        let (agent, _) = agent(AddressWidth::W32);
        assert_eq!(
            agent.from_bytes(&[1, 2, 3], None).unwrap_err(),
            ShareError::InvalidTransfer {
                expected: 4,
                found: 3
            }
        );
        assert_eq!(
            agent.from_bytes(&[0; 4], None).unwrap_err(),
            ShareError::NullTransfer
        );
    }

    #[test]
    #[should_panic(expected = "different region")]
    fn foreign_region_panics() {
        let (a, heap) = agent(AddressWidth::W32);
        let (b, _) = agent(AddressWidth::W32);
        let p = a.make(heap.malloc(8), None).unwrap();
        b.from_transferable(p.to_transferable(), None);
    }
}
