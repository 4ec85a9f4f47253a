// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Point tree: Morton-sorted particles with bounding-box node attributes.

use kurbo::{Point, Rect};
use spatialq::{FlatTree, ParticleTree, TreeKey, TreeShape};
use tracing::debug;

use crate::morton;

/// A bounding-volume hierarchy over 2D points.
///
/// Points are reordered along a Morton curve over their bounds, so nearby points
/// share subtrees. Each internal node stores the min corner (`Node0`) and max corner
/// (`Node1`) of the points below it. Query results refer to *sorted* particle indices;
/// use [`PointTree::original_index`] to map them back to input order.
#[derive(Clone)]
pub struct PointTree {
    tree: FlatTree<Point, Point, Point>,
    original: Vec<usize>,
    bounds: Option<Rect>,
}

impl PointTree {
    /// Build a tree over `points`.
    ///
    /// Coordinates are assumed finite. Points with equal Morton codes keep their input
    /// order.
    pub fn new(points: &[Point]) -> Self {
        debug_assert!(
            points.iter().all(|p| p.is_finite()),
            "point coordinates must be finite"
        );
        let bounds = points.split_first().map(|(first, rest)| {
            rest.iter()
                .fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p))
        });

        let mut original: Vec<usize> = (0..points.len()).collect();
        if let Some(bounds) = bounds {
            let codes: Vec<u32> = points.iter().map(|p| morton::code(*p, bounds)).collect();
            original.sort_by_key(|&i| (codes[i], i));
        }
        let sorted: Vec<Point> = original.iter().map(|&i| points[i]).collect();

        let tree: FlatTree<Point, Point, Point> = FlatTree::build(
            sorted,
            |p| (*p, *p),
            |(lmin, lmax), (rmin, rmax)| {
                (
                    Point::new(lmin.x.min(rmin.x), lmin.y.min(rmin.y)),
                    Point::new(lmax.x.max(rmax.x), lmax.y.max(rmax.y)),
                )
            },
        );
        let shape = tree.shape();
        debug!(
            num_particles = shape.num_particles(),
            effective_num_particles = shape.effective_num_particles(),
            effective_num_levels = shape.effective_num_levels(),
            "built point tree"
        );

        Self {
            tree,
            original,
            bounds,
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the tree holds no points.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Bounds of all points, `None` for an empty tree.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    /// Points in sorted (particle) order.
    pub fn points(&self) -> &[Point] {
        self.tree.particles()
    }

    /// Input position of sorted particle `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn original_index(&self, index: usize) -> usize {
        self.original[index]
    }

    /// Bounding box of the internal node at `key`, if the node is used.
    pub fn node_bounds(&self, key: TreeKey) -> Option<Rect> {
        self.tree
            .node(key)
            .map(|(min, max)| Rect::from_points(*min, *max))
    }
}

impl ParticleTree for PointTree {
    type Particle = Point;
    type Node0 = Point;
    type Node1 = Point;

    fn particles(&self) -> &[Point] {
        self.tree.particles()
    }

    fn node_values0(&self) -> &[Point] {
        self.tree.node_values0()
    }

    fn node_values1(&self) -> &[Point] {
        self.tree.node_values1()
    }

    fn shape(&self) -> TreeShape {
        self.tree.shape()
    }
}

impl core::fmt::Debug for PointTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PointTree")
            .field("len", &self.len())
            .field("bounds", &self.bounds)
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}

/// Squared distance from `p` to the box `[min, max]`; zero inside.
pub fn box_distance_squared(min: Point, max: Point, p: Point) -> f64 {
    let dx = (min.x - p.x).max(0.0).max(p.x - max.x);
    let dy = (min.y - p.y).max(0.0).max(p.y - max.y);
    dx * dx + dy * dy
}

/// Whether the box `[min, max]` overlaps `rect`, borders included.
pub fn box_overlaps(min: Point, max: Point, rect: Rect) -> bool {
    min.x <= rect.x1 && max.x >= rect.x0 && min.y <= rect.y1 && max.y >= rect.y0
}

/// Whether `p` lies in `rect`, borders included.
pub fn rect_contains_inclusive(rect: Rect, p: Point) -> bool {
    (rect.x0..=rect.x1).contains(&p.x) && (rect.y0..=rect.y1).contains(&p.y)
}
