// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=spatialq --heading-base-level=0

//! Spatialq: many independent spatial queries over one implicit binary tree.
//!
//! Spatialq runs batches of tree traversals in parallel. Each query walks a complete
//! binary tree laid over a sorted particle array and asks a user *handler* which nodes to
//! descend into and what to do with the particles it reaches.
//!
//! - [`TreeKey`] and [`TreeShape`] address nodes by `(level, local_node_id)` with no
//!   pointers; the tree is padded to a power of two and unused keys are never visited.
//! - [`RegisterBreadthFirst`] keeps a bounded frontier of at most `MAX_SELECTED_NODES`
//!   nodes per level. Selections beyond that bound are dropped.
//! - [`DepthFirst`] walks the tree with a two-word [`Cursor`] and no stack, backtracking
//!   either [`Strict`]ly (true preorder) or [`Relaxed`]ly (fewer ancestor visits).
//! - [`Device`] maps queries onto a rayon pool, grouped into work-groups, with
//!   per-launch error reporting through [`LaunchError`] and its status code.
//!
//! The engines never write to the tree. Everything a query produces goes through its
//! handler.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use spatialq::{
//!     Device, DeviceConfig, DepthFirst, DfsHandler, FlatTree, QueryHandler, Strict, TreeKey,
//! };
//!
//! // Sorted values, nodes store the min/max of their subtree.
//! let values: Vec<u32> = (0..100).map(|v| v * 3).collect();
//! let tree: FlatTree<u32, u32, u32> = FlatTree::build(values, |&v| (v, v), |(a0, a1), (b0, b1)| {
//!     (*a0.min(b0), *a1.max(b1))
//! });
//!
//! // Count values in `[lo, hi]`, one query per interval.
//! struct InRange {
//!     intervals: Vec<(u32, u32)>,
//!     counts: Vec<AtomicUsize>,
//! }
//!
//! impl QueryHandler<FlatTree<u32, u32, u32>> for InRange {
//!     type State = ((u32, u32), usize);
//!     fn num_independent_queries(&self) -> usize {
//!         self.intervals.len()
//!     }
//!     fn at_query_init(&self, query_id: usize) -> Self::State {
//!         (self.intervals[query_id], 0)
//!     }
//!     fn at_query_exit(&self, query_id: usize, (_, n): Self::State) {
//!         self.counts[query_id].store(n, Ordering::Relaxed);
//!     }
//! }
//!
//! impl DfsHandler<FlatTree<u32, u32, u32>> for InRange {
//!     fn select_node(
//!         &self,
//!         ((lo, hi), _): &mut Self::State,
//!         _key: TreeKey,
//!         _index: usize,
//!         min: &u32,
//!         max: &u32,
//!     ) -> bool {
//!         *min <= *hi && *max >= *lo
//!     }
//!     fn process_particle(&self, ((lo, hi), n): &mut Self::State, _: usize, v: &u32) -> bool {
//!         let hit = (*lo..=*hi).contains(v);
//!         *n += usize::from(hit);
//!         hit
//!     }
//! }
//!
//! let handler = InRange {
//!     intervals: vec![(0, 9), (30, 60), (1000, 2000)],
//!     counts: (0..3).map(|_| AtomicUsize::new(0)).collect(),
//! };
//! let device = Device::new(DeviceConfig::default()).unwrap();
//! device.launch(&DepthFirst::<Strict>::new(), &tree, &handler).unwrap();
//!
//! let counts: Vec<_> = handler.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect();
//! assert_eq!(counts, [4, 11, 0]);
//! ```
//!
//! ## Choosing an engine
//!
//! - [`DepthFirst`] visits exactly the nodes it needs and keeps per-query state tiny.
//!   Prefer it for selective queries such as range and nearest-neighbour searches.
//! - [`RegisterBreadthFirst`] hands the handler whole levels at a time, which suits
//!   policies that rank candidates against each other. Its frontier is bounded, so it
//!   can miss results once a level selects more than `MAX_SELECTED_NODES` nodes.
//!
//! ## Features
//!
//! - `std` (enabled by default): the [`Device`] launcher and [`LaunchError`], backed by
//!   rayon and parking_lot.
//!
//! Without `std` this crate is `no_std` and uses `alloc`; the tree, handler and engine
//! modules are available and queries can be run directly through
//! [`QueryEngine::run_query`].

#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod bfs;
pub mod dfs;
pub mod engine;
#[cfg(feature = "std")]
pub mod error;
pub mod handler;
pub mod key;
#[cfg(feature = "std")]
pub mod launch;
pub mod tree;

pub use bfs::{Frontier, NodeBatch, NodeRef, ParticleBatch, RegisterBreadthFirst};
pub use dfs::{Backtracking, Cursor, DepthFirst, Relaxed, Strict};
pub use engine::QueryEngine;
#[cfg(feature = "std")]
pub use error::{LaunchError, status};
pub use handler::{BfsHandler, DfsHandler, KernelArg, KernelArgs, QueryHandler};
pub use key::{TreeKey, TreeShape};
#[cfg(feature = "std")]
pub use launch::{Device, DeviceConfig, Event, NdRange, Program};
pub use tree::{FlatTree, ParticleTree};
