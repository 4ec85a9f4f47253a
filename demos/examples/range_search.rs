// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Range search.
//!
//! Build a point tree and run the same rectangle queries on both engines.
//!
//! Run:
//! - `cargo run -p spatialq_demos --example range_search`
//! - `RUST_LOG=spatialq=debug cargo run -p spatialq_demos --example range_search`

use kurbo::{Point, Rect};
use spatialq::{DepthFirst, Device, DeviceConfig, RegisterBreadthFirst, Strict};
use spatialq_points::{PointTree, RangeQuery};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // A 40x40 grid with unit spacing.
    let points: Vec<Point> = (0..40)
        .flat_map(|y| (0..40).map(move |x| Point::new(f64::from(x), f64::from(y))))
        .collect();
    let tree = PointTree::new(&points);
    println!("tree: {tree:?}");

    let rects = [
        Rect::new(0.0, 0.0, 2.0, 2.0),
        Rect::new(10.5, 10.5, 12.5, 20.5),
        Rect::new(-5.0, -5.0, 100.0, 0.0),
    ];

    let device = Device::new(DeviceConfig::default()).unwrap();

    let dfs = RangeQuery::new(rects);
    device
        .launch(&DepthFirst::<Strict>::new(), &tree, &dfs)
        .unwrap();

    // A frontier of 8 nodes is too narrow for the long strip in the third query.
    let bfs = RangeQuery::new(rects);
    device
        .launch(&RegisterBreadthFirst::<8>::new(), &tree, &bfs)
        .unwrap();

    let results = dfs.into_results().into_iter().zip(bfs.into_results());
    for (q, (d, b)) in results.enumerate() {
        println!(
            "query {q} {:?}: dfs {} hits, bfs {} hits",
            rects[q],
            d.len(),
            b.len()
        );
        let first: Vec<Point> = d
            .iter()
            .take(4)
            .map(|&i| points[tree.original_index(i)])
            .collect();
        println!("  first hits: {first:?}");
        assert!(b.iter().all(|i| d.contains(i)), "bfs hits are a subset");
    }
}
