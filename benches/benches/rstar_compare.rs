// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![cfg(feature = "compare_rstar")]

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::{Point, Rect};
use spatialq::{DepthFirst, Device, DeviceConfig, Strict};
use spatialq_points::{PointTree, RangeQuery};

use rstar::{AABB, RTree};

fn gen_grid_points(n: usize, cell: f64) -> Vec<Point> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            out.push(Point::new(x as f64 * cell, y as f64 * cell));
        }
    }
    out
}

fn gen_windows(n: usize, cell: f64, count: usize) -> Vec<Rect> {
    let extent = n as f64 * cell;
    (0..count)
        .map(|i| {
            let t = i as f64 / count as f64;
            let x0 = t * extent * 0.8;
            let y0 = (1.0 - t) * extent * 0.8;
            Rect::new(x0, y0, x0 + 8.0 * cell, y0 + 8.0 * cell)
        })
        .collect()
}

fn bench_rstar_compare(c: &mut Criterion) {
    let device = Device::new(DeviceConfig::default()).unwrap();
    let mut group = c.benchmark_group("rstar_compare");
    for &n in &[128usize, 256] {
        let points = gen_grid_points(n, 10.0);
        let windows = gen_windows(n, 10.0, 512);
        group.throughput(Throughput::Elements(windows.len() as u64));

        group.bench_function(format!("spatialq_build_query_n{}", n), |b| {
            b.iter_batched(
                || points.clone(),
                |points| {
                    let tree = PointTree::new(&points);
                    let handler = RangeQuery::new(windows.iter().copied());
                    device
                        .launch(&DepthFirst::<Strict>::new(), &tree, &handler)
                        .unwrap();
                    let hits: usize = handler.into_results().iter().map(Vec::len).sum();
                    black_box(hits);
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_function(format!("rstar_build_query_n{}", n), |b| {
            b.iter_batched(
                || points.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>(),
                |points| {
                    let tree = RTree::bulk_load(points);
                    let hits: usize = windows
                        .iter()
                        .map(|w| {
                            let aabb = AABB::from_corners([w.x0, w.y0], [w.x1, w.y1]);
                            tree.locate_in_envelope(&aabb).count()
                        })
                        .sum();
                    black_box(hits);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rstar_compare);
criterion_main!(benches);
