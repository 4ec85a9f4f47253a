// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Nearest neighbours.
//!
//! Submit k-nearest-neighbour queries without blocking, then wait on the event.
//!
//! Run:
//! - `cargo run -p spatialq_demos --example nearest_neighbors`

use std::sync::Arc;

use kurbo::Point;
use spatialq::{DepthFirst, Device, DeviceConfig, Relaxed};
use spatialq_points::{NearestNeighbors, PointTree};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Points on a spiral.
    let points: Vec<Point> = (0..5000)
        .map(|i| {
            let t = f64::from(i) * 0.05;
            Point::new(t * t.cos(), t * t.sin())
        })
        .collect();
    let tree = Arc::new(PointTree::new(&points));

    let queries = [Point::ZERO, Point::new(50.0, 50.0), Point::new(-200.0, 10.0)];
    let handler = Arc::new(NearestNeighbors::new(queries, 5));

    let device = Device::new(DeviceConfig::default().with_num_threads(4)).unwrap();
    let event = device
        .enqueue(
            Arc::new(DepthFirst::<Relaxed>::new()),
            Arc::clone(&tree),
            Arc::clone(&handler),
        )
        .unwrap();
    println!("submitted, complete: {}", event.is_complete());
    event.wait().unwrap();
    println!("status: {:?}", event.status());

    for (q, query) in queries.iter().enumerate() {
        println!("neighbours of {query:?}:");
        for n in handler.results(q) {
            let p = points[tree.original_index(n.index)];
            println!("  {p:?} at distance {:.3}", n.distance_squared.sqrt());
        }
    }
}
