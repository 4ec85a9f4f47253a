// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Register-bounded breadth-first engine.
//!
//! Each query descends the tree level by level while keeping the nodes selected on the
//! current level in a [`Frontier`] of at most `MAX_SELECTED_NODES` entries. All working
//! memory is a pair of fixed-size arrays on the worker's stack; nothing is allocated.
//!
//! ## Saturation
//!
//! When a handler selects more than `MAX_SELECTED_NODES` children on one level, the
//! selections beyond capacity are dropped in candidate order and the query continues
//! with a full frontier. This is not reported. The engine is only exact for policies
//! that keep the frontier small, such as spatially coherent queries on a balanced
//! hierarchy; pick the capacity accordingly.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::engine::QueryEngine;
use crate::handler::BfsHandler;
use crate::key::{TreeKey, TreeShape};
use crate::tree::ParticleTree;

/// Work-group size used unless configured otherwise.
pub const DEFAULT_BFS_GROUP_SIZE: usize = 256;

/// Local node ids selected for expansion on the current level.
///
/// Holds at most `N` ids, in ascending order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frontier<const N: usize> {
    local_ids: [usize; N],
    len: usize,
}

impl<const N: usize> Frontier<N> {
    const NON_EMPTY: () = assert!(
        N > 0,
        "register_breadth_first: Max_selected_nodes must be positive"
    );

    /// A frontier holding only the root.
    pub const fn root() -> Self {
        let () = Self::NON_EMPTY;
        Self {
            local_ids: [0; N],
            len: 1,
        }
    }

    /// Maximum number of nodes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of nodes.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no node is selected.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Local node ids in ascending order.
    pub fn as_slice(&self) -> &[usize] {
        &self.local_ids[..self.len]
    }

    /// Local node id of child candidate `candidate`.
    ///
    /// Candidate `2 * i` is the left child of the `i`-th node, `2 * i + 1` its right child.
    #[inline]
    pub const fn child_id(&self, candidate: usize) -> usize {
        debug_assert!(
            candidate < 2 * self.len,
            "register_breadth_first: child candidate < 2 * frontier length"
        );
        (self.local_ids[candidate >> 1] << 1) + (candidate & 1)
    }

    fn last(&self) -> usize {
        self.local_ids[self.len - 1]
    }

    /// Replace the frontier by the selected children, keeping at most `N` of them.
    ///
    /// The new ids are gathered in a scratch array and copied back after the scan, so
    /// candidates are always resolved against this level's frontier.
    fn compact(&mut self, selection: &SelectionMap<N>) {
        let mut next = [0_usize; N];
        let mut len = 0;
        for candidate in 0..2 * N {
            if len < N && selection.is_selected(candidate) {
                next[len] = self.child_id(candidate);
                len += 1;
            }
        }
        self.local_ids = next;
        self.len = len;
    }
}

/// One flag per child candidate, `2 * N` in total.
#[derive(Copy, Clone, Debug)]
struct SelectionMap<const N: usize> {
    flags: [[bool; 2]; N],
}

impl<const N: usize> SelectionMap<N> {
    const fn new() -> Self {
        Self {
            flags: [[false; 2]; N],
        }
    }

    fn clear(&mut self) {
        self.flags = [[false; 2]; N];
    }

    #[inline]
    fn set(&mut self, candidate: usize, selected: bool) {
        self.flags[candidate >> 1][candidate & 1] = selected;
    }

    #[inline]
    fn is_selected(&self, candidate: usize) -> bool {
        self.flags[candidate >> 1][candidate & 1]
    }
}

/// A resolved internal node: key, storage index, and both attribute records.
#[derive(Copy, Clone, Debug)]
pub struct NodeRef<'a, N0, N1> {
    /// Key of the node.
    pub key: TreeKey,
    /// Index into the node attribute arrays.
    pub index: usize,
    /// First attribute record.
    pub value0: &'a N0,
    /// Second attribute record.
    pub value1: &'a N1,
}

/// Child candidates of one level, handed to [`BfsHandler::select_nodes`].
pub struct NodeBatch<'a, T: ParticleTree, const N: usize> {
    tree: &'a T,
    shape: TreeShape,
    level: u32,
    frontier: &'a Frontier<N>,
    selection: &'a mut SelectionMap<N>,
    available_children: usize,
}

impl<'a, T: ParticleTree, const N: usize> NodeBatch<'a, T, N> {
    /// Frontier capacity (`MAX_SELECTED_NODES`).
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of real candidates; candidates are `0..available_children()`.
    pub const fn available_children(&self) -> usize {
        self.available_children
    }

    /// Level of the candidates.
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Shape of the traversed tree.
    pub const fn shape(&self) -> TreeShape {
        self.shape
    }

    /// Key of candidate `candidate`.
    #[inline]
    pub fn key(&self, candidate: usize) -> TreeKey {
        debug_assert!(
            candidate < self.available_children,
            "register_breadth_first: keyed candidate < available children"
        );
        TreeKey::new(self.level, self.frontier.child_id(candidate))
    }

    /// Resolve candidate `candidate` and load its attribute records.
    #[inline]
    pub fn load_node(&self, candidate: usize) -> NodeRef<'a, T::Node0, T::Node1> {
        debug_assert!(
            candidate < self.available_children,
            "register_breadth_first: candidate < available children"
        );
        let key = self.key(candidate);
        debug_assert!(
            key.local_node_id < TreeKey::num_nodes(self.level),
            "register_breadth_first: local_node_id < number nodes"
        );
        let global = key.encode_global_id(self.shape.effective_num_levels());
        debug_assert!(
            global >= self.shape.effective_num_particles(),
            "register_breadth_first: virtual global_node_index >= effective_num_particles"
        );
        let index = global - self.shape.effective_num_particles();
        debug_assert!(
            index < self.shape.num_nodes(),
            "register_breadth_first: global_node_index bounds"
        );
        NodeRef {
            key,
            index,
            value0: &self.tree.node_values0()[index],
            value1: &self.tree.node_values1()[index],
        }
    }

    /// Descend into candidate `candidate`. Out-of-range candidates are ignored.
    #[inline]
    pub fn select(&mut self, candidate: usize) {
        debug_assert!(
            candidate < self.available_children,
            "register_breadth_first: selected candidate < available children"
        );
        if candidate < self.available_children {
            self.selection.set(candidate, true);
        }
    }

    /// Do not descend into candidate `candidate`.
    #[inline]
    pub fn deselect(&mut self, candidate: usize) {
        if candidate < self.available_children {
            self.selection.set(candidate, false);
        }
    }

    /// Whether candidate `candidate` is currently selected.
    pub fn is_selected(&self, candidate: usize) -> bool {
        candidate < self.available_children && self.selection.is_selected(candidate)
    }
}

impl<T: ParticleTree, const N: usize> Debug for NodeBatch<'_, T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeBatch")
            .field("level", &self.level)
            .field("frontier", &self.frontier.as_slice())
            .field("available_children", &self.available_children)
            .finish_non_exhaustive()
    }
}

/// Candidate particles below the final frontier, handed to
/// [`BfsHandler::process_particles`].
pub struct ParticleBatch<'a, T: ParticleTree, const N: usize> {
    tree: &'a T,
    frontier: &'a Frontier<N>,
    len: usize,
}

impl<'a, T: ParticleTree, const N: usize> ParticleBatch<'a, T, N> {
    /// Number of real candidate particles.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no candidates.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index into the particle array of candidate `candidate`.
    ///
    /// On the particle level the local node id is the particle index.
    #[inline]
    pub fn particle_index(&self, candidate: usize) -> usize {
        debug_assert!(
            candidate < self.len,
            "register_breadth_first: particle candidate < available particles"
        );
        self.frontier.child_id(candidate)
    }

    /// Load candidate `candidate`, returning its particle index and record.
    #[inline]
    pub fn load_particle(&self, candidate: usize) -> (usize, &'a T::Particle) {
        let index = self.particle_index(candidate);
        (index, &self.tree.particles()[index])
    }

    /// All candidates in ascending particle order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a T::Particle)> + '_ {
        (0..self.len).map(|c| self.load_particle(c))
    }
}

impl<T: ParticleTree, const N: usize> Debug for ParticleBatch<'_, T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParticleBatch")
            .field("frontier", &self.frontier.as_slice())
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Breadth-first engine with a frontier of at most `MAX_SELECTED_NODES` nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegisterBreadthFirst<const MAX_SELECTED_NODES: usize> {
    group_size: usize,
}

impl<const MAX_SELECTED_NODES: usize> Default for RegisterBreadthFirst<MAX_SELECTED_NODES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const MAX_SELECTED_NODES: usize> RegisterBreadthFirst<MAX_SELECTED_NODES> {
    /// Engine with the default work-group size.
    pub const fn new() -> Self {
        Self {
            group_size: DEFAULT_BFS_GROUP_SIZE,
        }
    }

    /// Override the work-group size.
    pub const fn with_group_size(mut self, group_size: usize) -> Self {
        self.group_size = group_size;
        self
    }

    /// Frontier capacity.
    pub const fn max_selected_nodes(&self) -> usize {
        MAX_SELECTED_NODES
    }

    /// Walk the node levels and return the frontier right above the particle level.
    fn descend<T, H>(tree: &T, handler: &H, state: &mut H::State) -> Frontier<MAX_SELECTED_NODES>
    where
        T: ParticleTree,
        H: BfsHandler<T>,
    {
        let shape = tree.shape();
        let mut frontier = Frontier::<MAX_SELECTED_NODES>::root();
        let mut selection = SelectionMap::<MAX_SELECTED_NODES>::new();

        let mut level = 1;
        while !frontier.is_empty() && level < shape.particle_level() {
            // The last child of the last node is the only one that can be padding.
            let mut available_children = 2 * frontier.len();
            let last_child = TreeKey::new(level - 1, frontier.last()).children_last();
            if !shape.is_used(last_child) {
                available_children -= 1;
            }

            selection.clear();
            let mut batch = NodeBatch {
                tree,
                shape,
                level,
                frontier: &frontier,
                selection: &mut selection,
                available_children,
            };
            handler.select_nodes(state, &mut batch);

            frontier.compact(&selection);
            level += 1;
        }
        frontier
    }
}

impl<T, H, const MAX_SELECTED_NODES: usize> QueryEngine<T, H>
    for RegisterBreadthFirst<MAX_SELECTED_NODES>
where
    T: ParticleTree,
    H: BfsHandler<T>,
{
    const ENTRY_POINT: &'static str = "register_breadth_first";

    fn group_size(&self) -> Option<usize> {
        Some(self.group_size)
    }

    fn constants(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("Max_selected_nodes", MAX_SELECTED_NODES as u64),
            ("group_size", self.group_size as u64),
        ]
    }

    fn run_query(&self, tree: &T, handler: &H, query_id: usize) {
        let shape = tree.shape();
        let mut state = handler.at_query_init(query_id);

        if shape.num_particles() > 0 {
            let frontier = Self::descend(tree, handler, &mut state);
            if !frontier.is_empty() {
                let mut len = 2 * frontier.len();
                if frontier.child_id(len - 1) >= shape.num_particles() {
                    len -= 1;
                }
                let batch = ParticleBatch {
                    tree,
                    frontier: &frontier,
                    len,
                };
                handler.process_particles(&mut state, &batch);
            }
        }

        handler.at_query_exit(query_id, state);
    }
}
