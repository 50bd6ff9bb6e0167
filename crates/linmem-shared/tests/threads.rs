//! Shares crossing threads through transfers.

use std::sync::Arc;
use std::thread;

use linmem_core::{AddressWidth, Value};
use linmem_memory::{HeapAllocator, RawAllocator, SharedMemory};
use linmem_shared::{Agent, ShareError, SharedPtr, BLOCK_SIZE};
use linmem_test_utils::fixtures::particle;
use linmem_test_utils::{region, CountingDestructor, FailingAllocator, TrackingAllocator};
use linmem_view::StructView;

fn shared_heap() -> (SharedMemory, Arc<HeapAllocator>) {
    let mem = region(AddressWidth::W32, 1, 16);
    let heap = Arc::new(HeapAllocator::new(Arc::clone(&mem)));
    (mem, heap)
}

#[test]
fn payload_is_visible_to_the_receiving_agent() {
    let (mem, heap) = shared_heap();
    let desc = particle(AddressWidth::W32);
    let agent = Agent::new(Arc::clone(&mem), heap.clone());
    let p = agent.make_struct(&desc, None).unwrap();
    let view: StructView = p.view(&desc);
    view.set("id", 77u64);
    view.set("layer", 9u8);

    let (tx, rx) = crossbeam_channel::bounded(1);
    let (back_tx, back_rx) = crossbeam_channel::bounded(1);
    let worker = {
        let (mem, heap, desc) = (Arc::clone(&mem), heap.clone(), Arc::clone(&desc));
        thread::spawn(move || {
            let agent = Agent::new(mem, heap);
            let q = agent.from_transferable(rx.recv().unwrap(), None);
            let view: StructView = q.view(&desc);
            back_tx
                .send((view.value("id"), view.value("layer"), q.use_count()))
                .unwrap();
        })
    };
    tx.send(p.to_transferable()).unwrap();
    let (id, layer, count) = back_rx.recv().unwrap();
    worker.join().unwrap();

    assert_eq!(id, Value::Unsigned(77));
    assert_eq!(layer, Value::Unsigned(9));
    assert_eq!(count, 2);
    assert_eq!(p.use_count(), 1);
}

#[test]
fn concurrent_clone_and_drop_releases_once() {
    let (mem, heap) = shared_heap();
    let counter = CountingDestructor::new(heap.clone());
    let agent = Agent::new(Arc::clone(&mem), heap.clone());
    let mut p = agent
        .make(heap.malloc(64), Some(counter.destructor()))
        .unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let (tx, rx) = crossbeam_channel::bounded(1);
            tx.send(p.to_transferable()).unwrap();
            let (mem, heap) = (Arc::clone(&mem), heap.clone());
            thread::spawn(move || {
                let agent = Agent::new(mem, heap);
                let q = agent.from_transferable(rx.recv().unwrap(), None);
                let mut held: Vec<SharedPtr> = Vec::new();
                for i in 0..500 {
                    held.push(q.clone());
                    if i % 3 == 0 {
                        held.swap_remove(0);
                    }
                }
                assert!(q.use_count() >= 1 + held.len() as u32);
            })
        })
        .collect();
    p.reset();
    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(counter.runs(), 1);
    assert_eq!(heap.live_allocations(), 0);
}

#[test]
fn undelivered_transfer_dropped_elsewhere_is_reclaimed() {
    let (mem, heap) = shared_heap();
    let counter = CountingDestructor::new(heap.clone());
    let agent = Agent::new(mem, heap.clone());
    let p = agent
        .make(heap.malloc(8), Some(counter.destructor()))
        .unwrap();
    let payload = p.get();
    let t = p.to_transferable();
    drop(p);
    assert_eq!(counter.runs(), 0);

    thread::spawn(move || drop(t)).join().unwrap();

    assert_eq!(counter.released(), vec![payload]);
    assert_eq!(heap.live_allocations(), 0);
}

#[test]
fn transfer_round_trip_adds_one_reference() {
    let (mem, heap) = shared_heap();
    let sender = Agent::new(Arc::clone(&mem), heap.clone());
    let receiver = Agent::new(mem, heap.clone());
    let p = sender.make(heap.malloc(8), None).unwrap();
    let before = p.use_count();
    let q = receiver.from_transferable(p.to_transferable(), None);
    assert_eq!(q.get(), p.get());
    assert_eq!(q.use_count(), before + 1);
    assert_eq!(sender.local_handles(p.block()), 1);
    assert_eq!(receiver.local_handles(q.block()), 1);
}

#[test]
fn make_struct_reports_exhaustion_and_cleans_up() {
    let (mem, heap) = shared_heap();
    let desc = particle(AddressWidth::W32);

    let none = Agent::new(Arc::clone(&mem), Arc::new(FailingAllocator::always(heap.clone())));
    assert_eq!(
        none.make_struct(&desc, None).unwrap_err(),
        ShareError::Exhausted {
            requested: desc.size() as u64
        }
    );

    // Payload succeeds, control block fails: the payload must be returned.
    let tracked = Arc::new(TrackingAllocator::new(heap.clone()));
    let one = Agent::new(mem, Arc::new(FailingAllocator::new(tracked.clone(), 1)));
    assert_eq!(
        one.make_struct(&desc, None).unwrap_err(),
        ShareError::Exhausted {
            requested: BLOCK_SIZE
        }
    );
    assert_eq!(tracked.mallocs(), 1);
    assert!(tracked.live().is_empty());
    assert_eq!(heap.live_allocations(), 0);
}
