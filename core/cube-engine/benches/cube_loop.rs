//! Cube storage and looper benchmarks.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cube_engine::{
    CacheManager, CapacityPolicy, CellValue, Cube, Dimension, ElementId, LoopRequest,
    NumericCondition, SharedDimension,
};

/// A 3-D cube with `n` x `n` x 10 paths, every third one stored.
fn build_cube(n: u32) -> Cube {
    let a = Dimension::with_base_elements("A", &(0..n).collect::<Vec<_>>()).unwrap();
    let b = Dimension::with_base_elements("B", &(0..n).rev().collect::<Vec<_>>()).unwrap();
    let c = Dimension::with_base_elements("C", &(0..10).collect::<Vec<_>>()).unwrap();
    let dimensions: Vec<SharedDimension> = vec![Arc::new(a), Arc::new(b), Arc::new(c)];
    let mut cube = Cube::new(1, "Bench", dimensions, CapacityPolicy::default()).unwrap();

    let mut i = 0u32;
    for x in 0..n {
        for y in 0..n {
            for z in 0..10 {
                i += 1;
                if i % 3 == 0 {
                    cube.put(&[x, y, z], CellValue::Numeric(i as f64)).unwrap();
                }
            }
        }
    }
    cube
}

fn put_benchmark(c: &mut Criterion) {
    c.bench_function("cube_put_20x20x10", |b| b.iter(|| black_box(build_cube(20).cell_count())));
}

fn lookup_benchmark(c: &mut Criterion) {
    let cube = build_cube(50);
    c.bench_function("cube_lookup_10000", |b| {
        b.iter(|| {
            let mut found = 0;
            for x in 0..50 {
                for y in 0..50 {
                    for z in 0..4 {
                        if !cube.lookup(&[x, y, z]).unwrap().is_undefined() {
                            found += 1;
                        }
                    }
                }
            }
            black_box(found)
        })
    });
}

fn loop_benchmark(c: &mut Criterion) {
    let cube = build_cube(50);
    let mut group = c.benchmark_group("cube_loop");
    for size in [100usize, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("stored", size), &size, |b, &size| {
            let request = LoopRequest::new(size);
            b.iter(|| {
                let mut sum = 0.0;
                cube.loop_cells(|_, v| sum += v.as_number().unwrap_or(0.0), &request, None)
                    .unwrap();
                black_box(sum)
            })
        });
        group.bench_with_input(BenchmarkId::new("emit_all", size), &size, |b, &size| {
            let request = LoopRequest::new(size).emit_all(true);
            b.iter(|| {
                let mut count = 0;
                cube.loop_cells(|_, _| count += 1, &request, None).unwrap();
                black_box(count)
            })
        });
    }
    group.finish();
}

fn condition_benchmark(c: &mut Criterion) {
    let cube = build_cube(50);
    let condition = NumericCondition::parse("> 1000 and < 5000 or > 20000").unwrap();
    let request = LoopRequest::new(usize::MAX).with_condition(condition);
    c.bench_function("cube_loop_condition", |b| {
        b.iter(|| {
            let mut count = 0;
            cube.loop_cells(|_, _| count += 1, &request, None).unwrap();
            black_box(count)
        })
    });
}

fn cached_loop_benchmark(c: &mut Criterion) {
    let mut a = Dimension::with_base_elements("A", &(0..30).collect::<Vec<_>>()).unwrap();
    a.add_consolidated(1000).unwrap();
    let b_dim = Dimension::with_base_elements("B", &(0..30).collect::<Vec<_>>()).unwrap();
    let dimensions: Vec<SharedDimension> = vec![Arc::new(a), Arc::new(b_dim)];
    let mut cube = Cube::new(2, "Cached", dimensions, CapacityPolicy::default()).unwrap();
    for x in 0..30 {
        for y in 0..30 {
            cube.put(&[x, y], CellValue::Numeric((x * y) as f64)).unwrap();
        }
    }
    let manager = Arc::new(CacheManager::default());
    cube.attach_cache(&manager).unwrap();

    let request = LoopRequest::new(usize::MAX).emit_all(true);
    c.bench_function("cube_loop_cached_consolidation", |b| {
        b.iter(|| {
            let mut count = 0;
            cube.loop_cells_cached(
                |_, _| count += 1,
                &request,
                |path: &[ElementId]| CellValue::Numeric(path[1] as f64 * 435.0),
            )
            .unwrap();
            black_box(count)
        })
    });
}

criterion_group!(
    benches,
    put_benchmark,
    lookup_benchmark,
    loop_benchmark,
    condition_benchmark,
    cached_loop_benchmark
);
criterion_main!(benches);
