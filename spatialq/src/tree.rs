// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree collaborator contract and a flat, array-backed implementation.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::key::{TreeKey, TreeShape};

/// Read access to a sorted particle tree, as consumed by the query engines.
///
/// The engines only ever read these buffers. Node attribute arrays have
/// [`TreeShape::num_nodes`] entries and are indexed by [`TreeShape::node_index`];
/// particles are indexed by their leaf-level local node id.
pub trait ParticleTree: Sync {
    /// Particle record.
    type Particle: Sync;
    /// First node attribute (e.g. bounding box min corner).
    type Node0: Sync;
    /// Second node attribute (e.g. bounding box max corner).
    type Node1: Sync;

    /// Sorted particles; `shape().num_particles()` entries.
    fn particles(&self) -> &[Self::Particle];

    /// First node attribute array.
    fn node_values0(&self) -> &[Self::Node0];

    /// Second node attribute array.
    fn node_values1(&self) -> &[Self::Node1];

    /// Real and padded counts.
    fn shape(&self) -> TreeShape;
}

/// A particle tree stored in three flat arrays.
#[derive(Clone)]
pub struct FlatTree<P, N0, N1> {
    particles: Vec<P>,
    node_values0: Vec<N0>,
    node_values1: Vec<N1>,
    shape: TreeShape,
}

impl<P, N0, N1> FlatTree<P, N0, N1>
where
    N0: Clone + Default,
    N1: Clone + Default,
{
    /// Build node attributes bottom-up over already sorted particles.
    ///
    /// `leaf` computes the attribute pair of a single particle and `merge` combines the
    /// pairs of two sibling subtrees. A node whose right subtree is padding copies the
    /// pair of its left child. Padding nodes keep `Default` values; the engines never
    /// read them.
    pub fn build<F, M>(particles: Vec<P>, mut leaf: F, mut merge: M) -> Self
    where
        F: FnMut(&P) -> (N0, N1),
        M: FnMut((&N0, &N1), (&N0, &N1)) -> (N0, N1),
    {
        let shape = TreeShape::for_particles(particles.len());
        let mut node_values0 = vec![N0::default(); shape.num_nodes()];
        let mut node_values1 = vec![N1::default(); shape.num_nodes()];

        for level in (0..shape.particle_level()).rev() {
            for id in 0..TreeKey::num_nodes(level) {
                let key = TreeKey::new(level, id);
                if !shape.is_used(key) {
                    continue;
                }
                let left = key.children_begin();
                let right = key.children_last();
                let (v0, v1) = if level + 1 == shape.particle_level() {
                    let l = leaf(&particles[left.local_node_id]);
                    if shape.is_used(right) {
                        let r = leaf(&particles[right.local_node_id]);
                        merge((&l.0, &l.1), (&r.0, &r.1))
                    } else {
                        l
                    }
                } else {
                    let li = shape.node_index(left);
                    if shape.is_used(right) {
                        let ri = shape.node_index(right);
                        merge(
                            (&node_values0[li], &node_values1[li]),
                            (&node_values0[ri], &node_values1[ri]),
                        )
                    } else {
                        (node_values0[li].clone(), node_values1[li].clone())
                    }
                };
                let idx = shape.node_index(key);
                node_values0[idx] = v0;
                node_values1[idx] = v1;
            }
        }

        Self {
            particles,
            node_values0,
            node_values1,
            shape,
        }
    }
}

impl<P, N0, N1> FlatTree<P, N0, N1> {
    /// Whether the tree holds no particles.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Number of real particles.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Attribute pair of a used internal node.
    pub fn node(&self, key: TreeKey) -> Option<(&N0, &N1)> {
        if key.level >= self.shape.particle_level() || !self.shape.is_used(key) {
            return None;
        }
        let idx = self.shape.node_index(key);
        Some((&self.node_values0[idx], &self.node_values1[idx]))
    }
}

impl<P: Sync, N0: Sync, N1: Sync> ParticleTree for FlatTree<P, N0, N1> {
    type Particle = P;
    type Node0 = N0;
    type Node1 = N1;

    fn particles(&self) -> &[P] {
        &self.particles
    }

    fn node_values0(&self) -> &[N0] {
        &self.node_values0
    }

    fn node_values1(&self) -> &[N1] {
        &self.node_values1
    }

    fn shape(&self) -> TreeShape {
        self.shape
    }
}

impl<P, N0, N1> Debug for FlatTree<P, N0, N1> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlatTree")
            .field("num_particles", &self.shape.num_particles())
            .field(
                "effective_num_particles",
                &self.shape.effective_num_particles(),
            )
            .field("effective_num_levels", &self.shape.effective_num_levels())
            .finish_non_exhaustive()
    }
}

/// Interval tree over sorted integers, used by tests across the crate.
#[cfg(test)]
pub(crate) type IntervalTree = FlatTree<u32, u32, u32>;

#[cfg(test)]
pub(crate) fn interval_tree(n: u32) -> IntervalTree {
    FlatTree::build(
        (0..n).map(|v| v * 10).collect(),
        |p| (*p, *p),
        |l, r| ((*l.0).min(*r.0), (*l.1).max(*r.1)),
    )
}
