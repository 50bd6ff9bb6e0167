//! Criterion micro-benchmarks for tagged and typed accessor operations.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use linmem_bench::bench_region;
use linmem_core::{Address, AddressWidth, TypeTag, Value};

fn bench_tagged_read_write(c: &mut Criterion) {
    let (acc, _heap) = bench_region(AddressWidth::W32);
    let base = Address(4096);

    c.bench_function("accessor_write_read_u32_x1k", |b| {
        b.iter(|| {
            for i in 0..1024u64 {
                acc.write(TypeTag::U32, base.offset(i * 4), Value::Unsigned(i));
            }
            let mut sum = 0u64;
            for i in 0..1024u64 {
                if let Value::Unsigned(v) = acc.read(TypeTag::U32, base.offset(i * 4)) {
                    sum += v;
                }
            }
            black_box(sum)
        });
    });

    c.bench_function("accessor_write_read_f64_x1k", |b| {
        b.iter(|| {
            for i in 0..1024u64 {
                acc.write(TypeTag::F64, base.offset(i * 8), Value::Float(i as f64));
            }
            black_box(acc.read(TypeTag::F64, base.offset(8 * 512)))
        });
    });
}

fn bench_typed_and_atomic(c: &mut Criterion) {
    let (acc, _heap) = bench_region(AddressWidth::W64);
    let at = Address(4096);

    c.bench_function("accessor_typed_u64_x1k", |b| {
        b.iter(|| {
            for i in 0..1024u64 {
                acc.write_u64(at.offset(i * 8), i);
            }
            black_box(acc.read_u64(at.offset(8 * 1023)))
        });
    });

    c.bench_function("accessor_fetch_add_u32_x1k", |b| {
        b.iter(|| {
            for _ in 0..1024 {
                acc.fetch_add_u32(at, 1);
            }
            black_box(acc.atomic_load_u32(at))
        });
    });
}

criterion_group!(benches, bench_tagged_read_write, bench_typed_and_atomic);
criterion_main!(benches);
