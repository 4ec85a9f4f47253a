// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::{Point, Rect};
use spatialq::{DepthFirst, Device, DeviceConfig, RegisterBreadthFirst, Relaxed, Strict};
use spatialq_points::{NearestNeighbors, PointTree, RangeQuery};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

fn gen_points(count: usize, extent: f64, seed: u64) -> Vec<Point> {
    let mut rng = Rng::new(seed);
    (0..count)
        .map(|_| Point::new(rng.next_f64() * extent, rng.next_f64() * extent))
        .collect()
}

fn gen_windows(count: usize, extent: f64, size: f64) -> Vec<Rect> {
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    (0..count)
        .map(|_| {
            let x0 = rng.next_f64() * (extent - size);
            let y0 = rng.next_f64() * (extent - size);
            Rect::new(x0, y0, x0 + size, y0 + size)
        })
        .collect()
}

fn brute_force_range(points: &[Point], rects: &[Rect]) -> usize {
    rects
        .iter()
        .map(|r| {
            points
                .iter()
                .filter(|p| (r.x0..=r.x1).contains(&p.x) && (r.y0..=r.y1).contains(&p.y))
                .count()
        })
        .sum()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_tree_build");
    for &n in &[10_000usize, 100_000] {
        let points = gen_points(n, 1000.0, 0x1234_5678);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("morton_build_n{}", n), |b| {
            b.iter(|| black_box(PointTree::new(&points)));
        });
    }
    group.finish();
}

fn bench_range(c: &mut Criterion) {
    let device = Device::new(DeviceConfig::default()).unwrap();
    let mut group = c.benchmark_group("range_query");
    for &n in &[10_000usize, 100_000] {
        let points = gen_points(n, 1000.0, 0x1234_5678);
        let tree = PointTree::new(&points);
        let windows = gen_windows(1024, 1000.0, 20.0);
        group.throughput(Throughput::Elements(windows.len() as u64));

        group.bench_function(format!("dfs_strict_n{}", n), |b| {
            b.iter(|| {
                let handler = RangeQuery::new(windows.iter().copied());
                device
                    .launch(&DepthFirst::<Strict>::new(), &tree, &handler)
                    .unwrap();
                black_box(handler.into_results());
            });
        });

        group.bench_function(format!("dfs_relaxed_n{}", n), |b| {
            b.iter(|| {
                let handler = RangeQuery::new(windows.iter().copied());
                device
                    .launch(&DepthFirst::<Relaxed>::new(), &tree, &handler)
                    .unwrap();
                black_box(handler.into_results());
            });
        });

        group.bench_function(format!("bfs_max64_n{}", n), |b| {
            b.iter(|| {
                let handler = RangeQuery::new(windows.iter().copied());
                device
                    .launch(&RegisterBreadthFirst::<64>::new(), &tree, &handler)
                    .unwrap();
                black_box(handler.into_results());
            });
        });

        if n <= 10_000 {
            group.bench_function(format!("brute_force_n{}", n), |b| {
                b.iter(|| black_box(brute_force_range(&points, &windows)));
            });
        }
    }
    group.finish();
}

fn bench_knn(c: &mut Criterion) {
    let device = Device::new(DeviceConfig::default()).unwrap();
    let mut group = c.benchmark_group("nearest_neighbors");
    let points = gen_points(100_000, 1000.0, 0x1234_5678);
    let tree = PointTree::new(&points);
    let queries = gen_points(1024, 1000.0, 0x0BAD_5EED);
    group.throughput(Throughput::Elements(queries.len() as u64));
    for &k in &[1usize, 8, 32] {
        group.bench_function(format!("dfs_strict_k{}", k), |b| {
            b.iter(|| {
                let handler = NearestNeighbors::new(queries.iter().copied(), k);
                device
                    .launch(&DepthFirst::<Strict>::new(), &tree, &handler)
                    .unwrap();
                black_box(handler.into_results());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_range, bench_knn);
criterion_main!(benches);
