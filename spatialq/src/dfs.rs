// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stack-free depth-first engine.
//!
//! A query walks the tree with a single [`Cursor`]: the current key and the number of
//! particles covered so far. Selected nodes are entered through their left child.
//! Rejected nodes and examined particles add the real particles they cover to the
//! counter, then the cursor moves right; from a right child it first climbs back up
//! using the key's bit structure, as decided by the [`Backtracking`] strategy. The
//! query ends once every real particle is covered.
//!
//! Leaves are covered strictly left to right, so the counter always equals the first
//! leaf below the cursor and padding is never visited.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::marker::PhantomData;

use crate::engine::QueryEngine;
use crate::handler::DfsHandler;
use crate::key::{TreeKey, TreeShape};
use crate::tree::ParticleTree;

/// Work-group size used unless configured otherwise.
pub const DEFAULT_DFS_GROUP_SIZE: usize = 256;

/// How the cursor climbs back up after leaving a right child.
pub trait Backtracking: Copy + Default + Debug + Send + Sync + 'static {
    /// Value of the `Iteration_strategy` program constant.
    const ID: u64;

    /// The ancestor whose right neighbour is visited next.
    fn next_parent(key: TreeKey) -> TreeKey;
}

/// Climb through right-child ancestors until a left child or the root.
///
/// The next visited node is always the next unvisited node in left-to-right preorder,
/// so every used node on the way is offered to the handler.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Strict;

impl Backtracking for Strict {
    const ID: u64 = 0;

    #[inline]
    fn next_parent(key: TreeKey) -> TreeKey {
        let mut result = key.parent();
        while result.is_right_child() {
            result = result.parent();
        }
        result
    }
}

/// Climb exactly one level.
///
/// Cheaper per step. The cursor may continue on a deeper level than strict
/// backtracking would, skipping the evaluation of some ancestors; termination only
/// depends on the coverage counter. The order of discard notifications is not
/// specified under this strategy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Relaxed;

impl Backtracking for Relaxed {
    const ID: u64 = 1;

    #[inline]
    fn next_parent(key: TreeKey) -> TreeKey {
        key.parent()
    }
}

/// Traversal state of one depth-first query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    /// Current node or particle.
    pub key: TreeKey,
    /// Real particles covered so far, examined or skipped.
    pub covered: usize,
}

impl Cursor {
    /// Cursor at the root with nothing covered.
    pub const fn start() -> Self {
        Self {
            key: TreeKey::ROOT,
            covered: 0,
        }
    }

    /// Whether every real particle has been covered.
    #[inline]
    pub const fn is_done(&self, shape: &TreeShape) -> bool {
        self.covered >= shape.num_particles()
    }

    /// Enter the current node through its left child.
    #[inline]
    fn descend(&mut self) {
        self.key = self.key.children_begin();
    }

    /// Mark the current subtree covered and move to its right neighbour.
    #[inline]
    fn skip<S: Backtracking>(&mut self, shape: &TreeShape) {
        self.covered += shape.real_leaves(self.key);
        self.key = if self.key.is_right_child() {
            S::next_parent(self.key).next_sibling()
        } else {
            self.key.next_sibling()
        };
    }

    /// Run one step of the state machine.
    ///
    /// Returns `false` once the cursor is done, without touching the handler.
    pub fn step<T, H, S>(&mut self, tree: &T, handler: &H, state: &mut H::State) -> bool
    where
        T: ParticleTree,
        H: DfsHandler<T>,
        S: Backtracking,
    {
        let shape = tree.shape();
        if self.is_done(&shape) {
            return false;
        }
        debug_assert!(
            shape.is_used(self.key),
            "depth_first: cursor addresses a used key"
        );
        debug_assert_eq!(
            self.covered,
            self.key.first_leaf(shape.effective_num_levels()),
            "depth_first: covered particles match cursor position"
        );

        if self.key.level == shape.particle_level() {
            let index = self.key.local_node_id;
            let _accepted = handler.process_particle(state, index, &tree.particles()[index]);
            self.skip::<S>(&shape);
        } else {
            let index = shape.node_index(self.key);
            debug_assert!(
                index < shape.num_nodes(),
                "depth_first: global_node_index bounds"
            );
            let value0 = &tree.node_values0()[index];
            let value1 = &tree.node_values1()[index];
            if handler.select_node(state, self.key, index, value0, value1) {
                self.descend();
            } else {
                handler.on_node_discarded(state, index, value0, value1);
                self.skip::<S>(&shape);
            }
        }
        true
    }
}

/// Depth-first engine parameterized by its backtracking strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DepthFirst<S: Backtracking = Strict> {
    group_size: Option<usize>,
    _strategy: PhantomData<S>,
}

impl<S: Backtracking> Default for DepthFirst<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Backtracking> DepthFirst<S> {
    /// Engine with the default work-group size.
    pub const fn new() -> Self {
        Self {
            group_size: Some(DEFAULT_DFS_GROUP_SIZE),
            _strategy: PhantomData,
        }
    }

    /// Override the work-group size; `None` lets the device choose.
    pub const fn with_group_size(mut self, group_size: Option<usize>) -> Self {
        self.group_size = group_size;
        self
    }
}

impl<T, H, S> QueryEngine<T, H> for DepthFirst<S>
where
    T: ParticleTree,
    H: DfsHandler<T>,
    S: Backtracking,
{
    const ENTRY_POINT: &'static str = "depth_first";

    fn group_size(&self) -> Option<usize> {
        self.group_size
    }

    fn constants(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("Iteration_strategy", S::ID),
            ("group_size", self.group_size.unwrap_or(0) as u64),
        ]
    }

    fn run_query(&self, tree: &T, handler: &H, query_id: usize) {
        let mut state = handler.at_query_init(query_id);
        let mut cursor = Cursor::start();
        while cursor.step::<T, H, S>(tree, handler, &mut state) {}
        handler.at_query_exit(query_id, state);
    }
}
