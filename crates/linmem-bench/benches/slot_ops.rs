//! Slot allocator alloc/free churn.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use linmem_bench::churn_sizes;
use linmem_slots::{HandleTable, SlotAllocator, SlotConfig, VecSlotTable};

fn bench_churn(c: &mut Criterion) {
    let sizes = churn_sizes(512, 8);

    c.bench_function("slots_alloc_free_churn_512", |b| {
        b.iter(|| {
            let mut slots =
                SlotAllocator::new(VecSlotTable::<u32>::new(64), SlotConfig::new(1))
                    .expect("config");
            let mut live = Vec::with_capacity(sizes.len());
            for (i, &n) in sizes.iter().enumerate() {
                live.push(slots.alloc(n));
                if i % 2 == 1 {
                    let victim = live.swap_remove(i % live.len());
                    slots.free(victim);
                }
            }
            for start in live {
                slots.free(start);
            }
            black_box(slots.capacity())
        });
    });

    c.bench_function("handle_table_insert_remove_1k", |b| {
        b.iter(|| {
            let mut table = HandleTable::new();
            let ids: Vec<u32> = (0..1024u32).map(|v| table.insert(v)).collect();
            for id in ids.iter().step_by(2) {
                table.remove(*id);
            }
            for v in 0..512u32 {
                table.insert(v);
            }
            black_box(table.len())
        });
    });
}

criterion_group!(benches, bench_churn);
criterion_main!(benches);
