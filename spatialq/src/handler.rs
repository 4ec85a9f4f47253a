// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handler contract: the pluggable policy that drives a traversal.
//!
//! A handler decides how many independent queries run, which nodes each query
//! descends into, and which particles it accepts. It owns its outputs; the engines
//! never write anywhere. Per-query working data lives in [`QueryHandler::State`],
//! created by [`at_query_init`](QueryHandler::at_query_init) on the worker that runs
//! the query and handed back to [`at_query_exit`](QueryHandler::at_query_exit) on the
//! same worker, so it never needs to be shared.
//!
//! Handlers that write shared output are responsible for avoiding write conflicts,
//! typically with one output slot per query.

use alloc::vec::Vec;

use crate::bfs::{NodeBatch, ParticleBatch};
use crate::key::TreeKey;
use crate::tree::ParticleTree;

/// A single kernel argument binding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KernelArg {
    /// A buffer with `len` elements.
    Buffer {
        /// Number of elements.
        len: usize,
    },
    /// A scalar value.
    Scalar(u64),
}

/// Ordered, named arguments of a query launch.
///
/// Engines push the tree arguments first, then the handler pushes its own through
/// [`QueryHandler::push_arguments`]. Names must be unique within a launch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KernelArgs {
    args: Vec<(&'static str, KernelArg)>,
}

impl KernelArgs {
    /// Create an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a buffer argument.
    pub fn push_buffer(&mut self, name: &'static str, len: usize) -> &mut Self {
        self.args.push((name, KernelArg::Buffer { len }));
        self
    }

    /// Bind a scalar argument.
    pub fn push_scalar(&mut self, name: &'static str, value: u64) -> &mut Self {
        self.args.push((name, KernelArg::Scalar(value)));
        self
    }

    /// Look up an argument by name.
    pub fn get(&self, name: &str) -> Option<KernelArg> {
        self.args
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, a)| *a)
    }

    /// Iterate over bindings in push order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, KernelArg)> + '_ {
        self.args.iter().copied()
    }

    /// Number of bound arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// First name that is bound more than once.
    pub fn first_duplicate(&self) -> Option<&'static str> {
        self.args
            .iter()
            .enumerate()
            .find(|(i, (name, _))| self.args[..*i].iter().any(|(n, _)| n == name))
            .map(|(_, (name, _))| *name)
    }
}

/// Lifecycle and sizing shared by breadth-first and depth-first handlers.
pub trait QueryHandler<T: ParticleTree>: Sync {
    /// Per-query working data, private to the worker running the query.
    type State;

    /// Number of independent queries to execute.
    fn num_independent_queries(&self) -> usize;

    /// Bind handler buffers and parameters to the launch.
    fn push_arguments(&self, args: &mut KernelArgs) {
        let _ = args;
    }

    /// Called once per query before traversal starts.
    fn at_query_init(&self, query_id: usize) -> Self::State;

    /// Called once per query after traversal ends.
    fn at_query_exit(&self, query_id: usize, state: Self::State);
}

/// Policy for [`RegisterBreadthFirst`](crate::RegisterBreadthFirst).
pub trait BfsHandler<T: ParticleTree>: QueryHandler<T> {
    /// Evaluate the candidate children of the current frontier.
    ///
    /// Called once per level. Load candidates `0..batch.available_children()` through
    /// [`NodeBatch::load_node`] and mark the ones to descend into with
    /// [`NodeBatch::select`]. Unmarked candidates are not descended into. At most
    /// `batch.capacity()` selections survive; the rest are dropped in index order.
    fn select_nodes<const MAX: usize>(
        &self,
        state: &mut Self::State,
        batch: &mut NodeBatch<'_, T, MAX>,
    );

    /// Evaluate the candidate particles below the final frontier.
    fn process_particles<const MAX: usize>(
        &self,
        state: &mut Self::State,
        batch: &ParticleBatch<'_, T, MAX>,
    );
}

/// Policy for [`DepthFirst`](crate::DepthFirst).
pub trait DfsHandler<T: ParticleTree>: QueryHandler<T> {
    /// Whether to descend into the node at `key`. `index` is its node storage index.
    fn select_node(
        &self,
        state: &mut Self::State,
        key: TreeKey,
        index: usize,
        value0: &T::Node0,
        value1: &T::Node1,
    ) -> bool;

    /// Called exactly once for every node that [`select_node`](Self::select_node) rejected.
    fn on_node_discarded(
        &self,
        state: &mut Self::State,
        index: usize,
        value0: &T::Node0,
        value1: &T::Node1,
    ) {
        let _ = (state, index, value0, value1);
    }

    /// Examine a particle; returns whether it was accepted.
    fn process_particle(&self, state: &mut Self::State, index: usize, particle: &T::Particle)
    -> bool;
}
