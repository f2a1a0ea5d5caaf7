//! Benchmarks for the SIMD scoring kernels and the full top-K scan.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use semdex::vector::{
    EmbeddingData, VectorDimension, VectorEntry, VectorIndex, VectorPrecision, cosine_similarity,
    dot,
};
use semdex::ChunkKind;
use std::path::PathBuf;

const DIM: usize = 384;

/// Deterministic pseudo-random unit vector.
fn vector(seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    let mut v: Vec<f32> = (0..DIM)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 33) as f32 / (1u64 << 31) as f32) - 1.0
        })
        .collect();
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm;
    }
    v
}

fn build_index(n: usize) -> VectorIndex {
    let index = VectorIndex::new(
        VectorDimension::new(DIM).unwrap(),
        VectorPrecision::Full,
        0,
    )
    .unwrap();
    for i in 0..n {
        index
            .add_entry(VectorEntry {
                id: format!("chunk-{i}"),
                file_path: PathBuf::from(format!("src/file_{}.rs", i % 100)),
                start_line: 1,
                end_line: 10,
                content: String::new(),
                embedding: EmbeddingData::encode(&vector(i as u64), VectorPrecision::Full),
                kind: ChunkKind::Code,
                last_modified_utc: 0,
            })
            .unwrap();
    }
    index.build();
    index
}

fn bench_kernels(c: &mut Criterion) {
    let a = vector(1);
    let b = vector(2);

    c.bench_function("dot_384", |bencher| {
        bencher.iter(|| dot(black_box(&a), black_box(&b)));
    });
    c.bench_function("cosine_384", |bencher| {
        bencher.iter(|| cosine_similarity(black_box(&a), black_box(&b)));
    });
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_top10");
    for &n in &[1_000usize, 10_000, 50_000] {
        let index = build_index(n);
        let query = vector(99);
        group.bench_function(format!("{n}_entries"), |bencher| {
            bencher.iter(|| index.search(black_box(&query), 10).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_kernels, bench_search);
criterion_main!(benches);
