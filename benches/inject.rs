//! Benchmarks for the in-memory injection pipeline.
//!
//! Each stage is measured on its own against the generated fixture image, with and without a
//! portable PDB.

extern crate modinit;

use criterion::{criterion_group, criterion_main, Criterion};
use modinit::{
    initializer, inject_mem,
    metadata::signatures::parse_method_signature,
    CilAssembly, InjectOptions,
};
use std::hint::black_box;

#[path = "../tests/common/fixture.rs"]
mod fixture;

use fixture::FixtureBuilder;

/// Parse the image and build the metadata model.
fn bench_load(c: &mut Criterion) {
    let fixture = FixtureBuilder::new().with_pdb().build();

    c.bench_function("load_with_symbols", |b| {
        b.iter(|| {
            let assembly =
                CilAssembly::from_mem(black_box(fixture.image.clone()), fixture.pdb.clone())
                    .unwrap();
            black_box(assembly)
        });
    });
}

/// Synthesize and add the initializer, without serializing.
fn bench_synthesize(c: &mut Criterion) {
    let image = FixtureBuilder::new().build().image;

    c.bench_function("synthesize_initializer", |b| {
        b.iter_batched(
            || CilAssembly::from_mem(image.clone(), None).unwrap(),
            |mut assembly| {
                let token = initializer::inject(&mut assembly, true).unwrap();
                black_box(token)
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Whole pipeline: load, inject, rebuild image and PDB.
fn bench_pipeline(c: &mut Criterion) {
    let fixture = FixtureBuilder::new().with_pdb().with_pdb_checksum().build();
    let options = InjectOptions::default();

    c.bench_function("inject_mem_with_symbols", |b| {
        b.iter(|| {
            let injected = inject_mem(
                black_box(fixture.image.clone()),
                fixture.pdb.clone(),
                &options,
            )
            .unwrap();
            black_box(injected)
        });
    });

    let image = FixtureBuilder::new().build().image;
    c.bench_function("inject_mem", |b| {
        b.iter(|| {
            let injected = inject_mem(black_box(image.clone()), None, &options).unwrap();
            black_box(injected)
        });
    });
}

/// Signature: void Method()
fn bench_method_signature(c: &mut Criterion) {
    let signature = [0x00, 0x00, 0x01];

    c.bench_function("sig_method_void_no_params", |b| {
        b.iter(|| {
            let sig = parse_method_signature(black_box(&signature)).unwrap();
            black_box(sig)
        });
    });
}

criterion_group!(
    benches,
    bench_load,
    bench_synthesize,
    bench_pipeline,
    bench_method_signature
);
criterion_main!(benches);
