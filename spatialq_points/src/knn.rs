// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! k-nearest-neighbour search.

use kurbo::Point;
use parking_lot::Mutex;
use spatialq::{DfsHandler, KernelArgs, QueryHandler, TreeKey};

use crate::tree::{PointTree, box_distance_squared};

/// A neighbour found by [`NearestNeighbors`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Neighbor {
    /// Sorted particle index.
    pub index: usize,
    /// Squared distance to the query point.
    pub distance_squared: f64,
}

/// Finds the `k` points closest to each query point.
///
/// Depth-first only: pruning relies on the candidate list filling up before far
/// subtrees are reached.
#[derive(Debug)]
pub struct NearestNeighbors {
    queries: Vec<Point>,
    k: usize,
    results: Vec<Mutex<Vec<Neighbor>>>,
}

/// Per-query state of [`NearestNeighbors`]: the query point and the best candidates
/// so far, closest first.
#[derive(Debug)]
pub struct KnnState {
    query: Point,
    best: Vec<Neighbor>,
}

impl KnnState {
    /// Squared distance a new candidate must beat, `None` while the list is not full.
    fn bound(&self, k: usize) -> Option<f64> {
        match k.checked_sub(1) {
            None => Some(f64::NEG_INFINITY),
            Some(kth) => self.best.get(kth).map(|n| n.distance_squared),
        }
    }

    /// Insert `candidate` if it ranks among the `k` closest; returns whether it did.
    fn offer(&mut self, k: usize, candidate: Neighbor) -> bool {
        let at = self
            .best
            .partition_point(|n| n.distance_squared <= candidate.distance_squared);
        if at >= k {
            return false;
        }
        self.best.insert(at, candidate);
        self.best.truncate(k);
        true
    }
}

impl NearestNeighbors {
    /// One query per point, each looking for `k` neighbours.
    pub fn new(queries: impl IntoIterator<Item = Point>, k: usize) -> Self {
        let queries: Vec<Point> = queries.into_iter().collect();
        let results = queries.iter().map(|_| Mutex::new(Vec::new())).collect();
        Self {
            queries,
            k,
            results,
        }
    }

    /// Number of neighbours per query.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Neighbours of query `query_id`, closest first.
    pub fn results(&self, query_id: usize) -> Vec<Neighbor> {
        self.results[query_id].lock().clone()
    }

    /// Neighbours of every query, closest first.
    pub fn into_results(self) -> Vec<Vec<Neighbor>> {
        self.results.into_iter().map(Mutex::into_inner).collect()
    }
}

impl QueryHandler<PointTree> for NearestNeighbors {
    type State = KnnState;

    fn num_independent_queries(&self) -> usize {
        self.queries.len()
    }

    fn push_arguments(&self, args: &mut KernelArgs) {
        args.push_buffer("query_points", self.queries.len())
            .push_scalar("k", self.k as u64)
            .push_buffer("results", self.results.len() * self.k);
    }

    fn at_query_init(&self, query_id: usize) -> KnnState {
        KnnState {
            query: self.queries[query_id],
            best: Vec::with_capacity(self.k),
        }
    }

    fn at_query_exit(&self, query_id: usize, state: KnnState) {
        *self.results[query_id].lock() = state.best;
    }
}

impl DfsHandler<PointTree> for NearestNeighbors {
    fn select_node(
        &self,
        state: &mut KnnState,
        _key: TreeKey,
        _index: usize,
        min: &Point,
        max: &Point,
    ) -> bool {
        match state.bound(self.k) {
            None => true,
            Some(worst) => box_distance_squared(*min, *max, state.query) < worst,
        }
    }

    fn process_particle(&self, state: &mut KnnState, index: usize, p: &Point) -> bool {
        let distance_squared = state.query.distance_squared(*p);
        state.offer(
            self.k,
            Neighbor {
                index,
                distance_squared,
            },
        )
    }
}
