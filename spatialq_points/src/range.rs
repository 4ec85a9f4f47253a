// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rectangle range search.

use kurbo::{Point, Rect};
use parking_lot::Mutex;
use spatialq::{
    BfsHandler, DfsHandler, KernelArgs, NodeBatch, ParticleBatch, QueryHandler, TreeKey,
};

use crate::tree::{PointTree, box_overlaps, rect_contains_inclusive};

/// Finds the points inside each of a set of rectangles.
///
/// Rectangle borders are inclusive. Works with both engines; with
/// [`RegisterBreadthFirst`](spatialq::RegisterBreadthFirst) a query whose level selects
/// more nodes than the frontier holds reports only part of its hits.
#[derive(Debug)]
pub struct RangeQuery {
    rects: Vec<Rect>,
    results: Vec<Mutex<Vec<usize>>>,
}

/// Per-query state of [`RangeQuery`].
#[derive(Debug)]
pub struct RangeState {
    rect: Rect,
    hits: Vec<usize>,
}

impl RangeQuery {
    /// One query per rectangle. Rectangles are normalized first.
    pub fn new(rects: impl IntoIterator<Item = Rect>) -> Self {
        let rects: Vec<Rect> = rects.into_iter().map(|r| r.abs()).collect();
        let results = rects.iter().map(|_| Mutex::new(Vec::new())).collect();
        Self { rects, results }
    }

    /// The query rectangles.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Sorted particle indices found by query `query_id` so far.
    pub fn results(&self, query_id: usize) -> Vec<usize> {
        self.results[query_id].lock().clone()
    }

    /// Sorted particle indices of every query.
    pub fn into_results(self) -> Vec<Vec<usize>> {
        self.results.into_iter().map(Mutex::into_inner).collect()
    }
}

impl QueryHandler<PointTree> for RangeQuery {
    type State = RangeState;

    fn num_independent_queries(&self) -> usize {
        self.rects.len()
    }

    fn push_arguments(&self, args: &mut KernelArgs) {
        args.push_buffer("query_rects", self.rects.len())
            .push_buffer("results", self.results.len());
    }

    fn at_query_init(&self, query_id: usize) -> RangeState {
        RangeState {
            rect: self.rects[query_id],
            hits: Vec::new(),
        }
    }

    fn at_query_exit(&self, query_id: usize, mut state: RangeState) {
        state.hits.sort_unstable();
        *self.results[query_id].lock() = state.hits;
    }
}

impl DfsHandler<PointTree> for RangeQuery {
    fn select_node(
        &self,
        state: &mut RangeState,
        _key: TreeKey,
        _index: usize,
        min: &Point,
        max: &Point,
    ) -> bool {
        box_overlaps(*min, *max, state.rect)
    }

    fn process_particle(&self, state: &mut RangeState, index: usize, p: &Point) -> bool {
        let hit = rect_contains_inclusive(state.rect, *p);
        if hit {
            state.hits.push(index);
        }
        hit
    }
}

impl BfsHandler<PointTree> for RangeQuery {
    fn select_nodes<const MAX: usize>(
        &self,
        state: &mut RangeState,
        batch: &mut NodeBatch<'_, PointTree, MAX>,
    ) {
        for c in 0..batch.available_children() {
            let node = batch.load_node(c);
            if box_overlaps(*node.value0, *node.value1, state.rect) {
                batch.select(c);
            }
        }
    }

    fn process_particles<const MAX: usize>(
        &self,
        state: &mut RangeState,
        batch: &ParticleBatch<'_, PointTree, MAX>,
    ) {
        for (index, p) in batch.iter() {
            if rect_contains_inclusive(state.rect, *p) {
                state.hits.push(index);
            }
        }
    }
}
