// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Implicit binary tree addressing.
//!
//! A tree over `effective_num_particles` leaves is stored level by level, from the
//! particle level upwards. With `L = effective_num_levels`, the key `(level, id)` has
//! the global index
//!
//! `global(level, id) = 2^L - 2^(level + 1) + id`
//!
//! so particles occupy `[0, Neff)`, internal nodes occupy `[Neff, 2 * Neff - 1)`, and
//! the root is `2 * Neff - 2`. Node attribute arrays are indexed by the *storage index*
//! `global - Neff`.

/// Address of a node or particle in the implicit binary tree.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeKey {
    /// Depth of the node; `0` is the root.
    pub level: u32,
    /// Index of the node within its level, counted from the left.
    pub local_node_id: usize,
}

impl TreeKey {
    /// The root node.
    pub const ROOT: Self = Self::new(0, 0);

    /// Create a key from its level and local node id.
    pub const fn new(level: u32, local_node_id: usize) -> Self {
        Self {
            level,
            local_node_id,
        }
    }

    /// Number of node slots in a complete level.
    #[inline]
    pub const fn num_nodes(level: u32) -> usize {
        1 << level
    }

    /// Number of leaves (particle slots, padding included) below a node of `level`.
    #[inline]
    pub const fn leaves_per_node(level: u32, effective_num_levels: u32) -> usize {
        1 << (effective_num_levels - 1 - level)
    }

    /// Encode the key as a global index.
    #[inline]
    pub const fn encode_global_id(self, effective_num_levels: u32) -> usize {
        (1 << effective_num_levels) - (1 << (self.level + 1)) + self.local_node_id
    }

    /// Decode a global index produced by [`encode_global_id`](Self::encode_global_id).
    #[inline]
    pub const fn decode_global_id(global_id: usize, effective_num_levels: u32) -> Self {
        debug_assert!(
            global_id < (1 << effective_num_levels) - 1,
            "binary_tree: global id out of range"
        );
        let level = ((1_usize << effective_num_levels) - global_id - 1).ilog2();
        let level_begin = (1 << effective_num_levels) - (1 << (level + 1));
        Self::new(level, global_id - level_begin)
    }

    /// The parent key. Must not be called on the root.
    #[inline]
    pub const fn parent(self) -> Self {
        debug_assert!(self.level > 0, "binary_tree: root has no parent");
        Self::new(self.level - 1, self.local_node_id >> 1)
    }

    /// The leftmost child.
    #[inline]
    pub const fn children_begin(self) -> Self {
        Self::new(self.level + 1, self.local_node_id << 1)
    }

    /// The rightmost child.
    #[inline]
    pub const fn children_last(self) -> Self {
        Self::new(self.level + 1, (self.local_node_id << 1) + 1)
    }

    /// Whether this key is the right child of its parent.
    #[inline]
    pub const fn is_right_child(self) -> bool {
        self.local_node_id & 1 == 1
    }

    /// The next key to the right on the same level.
    #[inline]
    pub const fn next_sibling(self) -> Self {
        Self::new(self.level, self.local_node_id + 1)
    }

    /// Index of the first leaf covered by this key.
    #[inline]
    pub const fn first_leaf(self, effective_num_levels: u32) -> usize {
        self.local_node_id << (effective_num_levels - 1 - self.level)
    }

    /// Whether the key addresses real data rather than padding.
    #[inline]
    pub const fn is_node_used(self, effective_num_levels: u32, num_particles: usize) -> bool {
        self.local_node_id < Self::num_nodes(self.level)
            && self.first_leaf(effective_num_levels) < num_particles
    }
}

/// Particle and level counts of an implicit tree, including padding.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TreeShape {
    num_particles: usize,
    effective_num_particles: usize,
    effective_num_levels: u32,
}

impl TreeShape {
    /// Shape of the smallest complete binary tree holding `num_particles` leaves.
    ///
    /// The padded leaf count has a floor of two so that the tree always has a root node.
    /// A single particle therefore gets two leaves and two levels, not the one-leaf,
    /// one-level tree a plain power-of-two rounding would give.
    pub const fn for_particles(num_particles: usize) -> Self {
        let mut effective_num_particles = num_particles.next_power_of_two();
        if effective_num_particles < 2 {
            effective_num_particles = 2;
        }
        Self {
            num_particles,
            effective_num_particles,
            effective_num_levels: effective_num_particles.trailing_zeros() + 1,
        }
    }

    /// Validate counts computed elsewhere.
    ///
    /// Returns `None` unless the counts match [`for_particles`](Self::for_particles).
    pub fn from_parts(
        num_particles: usize,
        effective_num_particles: usize,
        effective_num_levels: u32,
    ) -> Option<Self> {
        let shape = Self::for_particles(num_particles);
        (shape.effective_num_particles == effective_num_particles
            && shape.effective_num_levels == effective_num_levels)
            .then_some(shape)
    }

    /// Number of real particles.
    pub const fn num_particles(&self) -> usize {
        self.num_particles
    }

    /// Number of leaf slots, padding included.
    pub const fn effective_num_particles(&self) -> usize {
        self.effective_num_particles
    }

    /// Number of levels, particle level included.
    pub const fn effective_num_levels(&self) -> u32 {
        self.effective_num_levels
    }

    /// The level that holds particles.
    pub const fn particle_level(&self) -> u32 {
        self.effective_num_levels - 1
    }

    /// Length of each node attribute array.
    pub const fn num_nodes(&self) -> usize {
        self.effective_num_particles - 1
    }

    /// Whether `key` addresses real data.
    #[inline]
    pub const fn is_used(&self, key: TreeKey) -> bool {
        key.is_node_used(self.effective_num_levels, self.num_particles)
    }

    /// Index into the node attribute arrays for an internal node.
    #[inline]
    pub const fn node_index(&self, key: TreeKey) -> usize {
        debug_assert!(
            key.level < self.effective_num_levels - 1,
            "binary_tree: particle keys have no node index"
        );
        key.encode_global_id(self.effective_num_levels) - self.effective_num_particles
    }

    /// Number of real particles below `key`.
    #[inline]
    pub const fn real_leaves(&self, key: TreeKey) -> usize {
        let first = key.first_leaf(self.effective_num_levels);
        let end = first + TreeKey::leaves_per_node(key.level, self.effective_num_levels);
        let end = if end < self.num_particles {
            end
        } else {
            self.num_particles
        };
        end.saturating_sub(first)
    }
}
