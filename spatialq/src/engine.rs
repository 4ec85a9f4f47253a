// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine abstraction used by the launch adapter.

use alloc::vec::Vec;

use crate::handler::{KernelArgs, QueryHandler};
use crate::tree::ParticleTree;

/// A traversal algorithm that can be dispatched on a [`Device`](crate::Device).
///
/// Implementations run a single query to completion in [`run_query`](Self::run_query);
/// the device decides which worker runs which query.
pub trait QueryEngine<T: ParticleTree, H: QueryHandler<T>>: Sync {
    /// Name of the generated entry point, used in program records and logs.
    const ENTRY_POINT: &'static str;

    /// Preferred work-group size; `None` lets the device choose.
    fn group_size(&self) -> Option<usize>;

    /// Compile-time parameters of this instantiation.
    fn constants(&self) -> Vec<(&'static str, u64)>;

    /// Traverse the tree for one query, from `at_query_init` to `at_query_exit`.
    fn run_query(&self, tree: &T, handler: &H, query_id: usize);
}

/// Bind the tree buffers and counts every engine receives.
pub fn push_tree_arguments<T: ParticleTree>(tree: &T, args: &mut KernelArgs) {
    let shape = tree.shape();
    args.push_buffer("particles", tree.particles().len())
        .push_buffer("node_values0", tree.node_values0().len())
        .push_buffer("node_values1", tree.node_values1().len())
        .push_scalar("num_particles", shape.num_particles() as u64)
        .push_scalar(
            "effective_num_particles",
            shape.effective_num_particles() as u64,
        )
        .push_scalar(
            "effective_num_levels",
            u64::from(shape.effective_num_levels()),
        );
}
