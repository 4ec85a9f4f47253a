// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=spatialq_points --heading-base-level=0

//! Spatialq Points: Kurbo-native 2D point trees and ready-made spatial queries.
//!
//! This crate builds a [`spatialq`] particle tree over [`kurbo::Point`]s and provides
//! handlers for the two most common query kinds.
//!
//! - [`PointTree`]: points sorted along a Morton (Z-order) curve, with bounding-box
//!   node attributes (min corner, max corner).
//! - [`RangeQuery`]: all points inside a rectangle, borders inclusive. Runs on either
//!   engine.
//! - [`NearestNeighbors`]: the `k` closest points to a query point. Runs on
//!   [`DepthFirst`](spatialq::DepthFirst).
//!
//! Results are reported as *sorted* particle indices. [`PointTree::original_index`]
//! maps them back to the order the points were given in.
//!
//! # Example
//!
//! ```rust
//! use kurbo::{Point, Rect};
//! use spatialq::{DepthFirst, Device, DeviceConfig, Strict};
//! use spatialq_points::{NearestNeighbors, PointTree, RangeQuery};
//!
//! let points: Vec<Point> = (0..10)
//!     .flat_map(|x| (0..10).map(move |y| Point::new(x as f64, y as f64)))
//!     .collect();
//! let tree = PointTree::new(&points);
//! let device = Device::new(DeviceConfig::default()).unwrap();
//!
//! // Points in a 3x2 window.
//! let ranges = RangeQuery::new([Rect::new(2.0, 2.0, 4.0, 3.0)]);
//! device.launch(&DepthFirst::<Strict>::new(), &tree, &ranges).unwrap();
//! let hits = ranges.into_results().remove(0);
//! assert_eq!(hits.len(), 6);
//!
//! // The nearest grid point to (7.2, 0.9).
//! let knn = NearestNeighbors::new([Point::new(7.2, 0.9)], 1);
//! device.launch(&DepthFirst::<Strict>::new(), &tree, &knn).unwrap();
//! let nearest = knn.results(0)[0];
//! assert_eq!(points[tree.original_index(nearest.index)], Point::new(7.0, 1.0));
//! ```

pub mod knn;
pub mod morton;
pub mod range;
pub mod tree;

pub use knn::{KnnState, Neighbor, NearestNeighbors};
pub use range::{RangeQuery, RangeState};
pub use tree::PointTree;
