//! Eager vs on-demand field access through struct views.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use linmem_bench::bench_region;
use linmem_core::{AddressWidth, FieldPath};
use linmem_test_utils::fixtures::particle;
use linmem_view::{Eager, OnDemand, StructView, ViewStrategy};

fn field_churn<S: ViewStrategy>(view: &StructView<S>) {
    for i in 0..64u32 {
        view.set("id", i as u64);
        view.set("layer", (i % 32) as u8);
        view.get("pos").into_struct().set("y", i as f32);
        black_box(view.value("mass"));
    }
}

fn bench_strategies(c: &mut Criterion) {
    let (acc, heap) = bench_region(AddressWidth::W32);
    let desc = particle(AddressWidth::W32);
    let eager = StructView::<Eager>::alloc(&acc, &*heap, &desc).expect("alloc");
    let lazy = StructView::<OnDemand>::alloc(&acc, &*heap, &desc).expect("alloc");

    let mut group = c.benchmark_group("view_field_access");
    group.bench_function(BenchmarkId::new("strategy", "eager"), |b| {
        b.iter(|| field_churn(&eager))
    });
    group.bench_function(BenchmarkId::new("strategy", "on-demand"), |b| {
        b.iter(|| field_churn(&lazy))
    });
    group.finish();

    c.bench_function("view_construct_eager", |b| {
        b.iter(|| black_box(StructView::<Eager>::new(acc.clone(), eager.address(), desc.clone())))
    });
    c.bench_function("view_construct_on_demand", |b| {
        b.iter(|| black_box(StructView::<OnDemand>::new(acc.clone(), lazy.address(), desc.clone())))
    });
}

fn bench_paths(c: &mut Criterion) {
    let (acc, heap) = bench_region(AddressWidth::W32);
    let desc = particle(AddressWidth::W32);
    let view = StructView::<OnDemand>::alloc(&acc, &*heap, &desc).expect("alloc");
    let path: FieldPath = "history[].z".parse().expect("path");
    let resolved = view.resolve(&path);

    c.bench_function("view_path_resolve_each_time", |b| {
        b.iter(|| black_box(view.get_path(&path, &[1]).into_value()))
    });
    c.bench_function("view_path_pre_resolved", |b| {
        b.iter(|| black_box(view.get_resolved(&resolved, &[1]).into_value()))
    });
}

criterion_group!(benches, bench_strategies, bench_paths);
criterion_main!(benches);
