// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Custom breadth-first handler.
//!
//! Sorted 1D positions with min/max nodes. Every particle looks for neighbours within a
//! radius, one query per particle, and the handler reports when its bounded frontier
//! had to drop selections.
//!
//! Run:
//! - `cargo run -p spatialq_demos --example custom_handler`

use std::sync::atomic::{AtomicUsize, Ordering};

use spatialq::{
    BfsHandler, Device, DeviceConfig, FlatTree, KernelArgs, NodeBatch, ParticleBatch,
    ParticleTree, QueryHandler, RegisterBreadthFirst,
};
use tracing_subscriber::EnvFilter;

type Line = FlatTree<f64, f64, f64>;

struct Neighbours {
    centres: Vec<f64>,
    radius: f64,
    counts: Vec<AtomicUsize>,
    saturated: AtomicUsize,
}

impl QueryHandler<Line> for Neighbours {
    type State = (f64, usize);

    fn num_independent_queries(&self) -> usize {
        self.centres.len()
    }

    fn push_arguments(&self, args: &mut KernelArgs) {
        args.push_buffer("centres", self.centres.len())
            .push_buffer("neighbour_counts", self.counts.len());
    }

    fn at_query_init(&self, query_id: usize) -> Self::State {
        (self.centres[query_id], 0)
    }

    fn at_query_exit(&self, query_id: usize, (_, count): Self::State) {
        self.counts[query_id].store(count, Ordering::Relaxed);
    }
}

impl BfsHandler<Line> for Neighbours {
    fn select_nodes<const MAX: usize>(
        &self,
        (centre, _): &mut Self::State,
        batch: &mut NodeBatch<'_, Line, MAX>,
    ) {
        let (lo, hi) = (*centre - self.radius, *centre + self.radius);
        let mut selected = 0;
        for c in 0..batch.available_children() {
            let node = batch.load_node(c);
            if *node.value0 <= hi && *node.value1 >= lo {
                batch.select(c);
                selected += 1;
            }
        }
        if selected > batch.capacity() {
            self.saturated.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn process_particles<const MAX: usize>(
        &self,
        (centre, count): &mut Self::State,
        batch: &ParticleBatch<'_, Line, MAX>,
    ) {
        *count += batch
            .iter()
            .filter(|(_, x)| (**x - *centre).abs() <= self.radius)
            .count();
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Dense on the left, sparse on the right.
    let positions: Vec<f64> = (0..2000).map(|i| (f64::from(i) / 40.0).powi(2)).collect();
    let tree: Line = FlatTree::build(
        positions,
        |&x| (x, x),
        |(a0, a1), (b0, b1)| (a0.min(*b0), a1.max(*b1)),
    );

    let neighbours = Neighbours {
        centres: tree.particles().to_vec(),
        radius: 1.0,
        counts: (0..tree.len()).map(|_| AtomicUsize::new(0)).collect(),
        saturated: AtomicUsize::new(0),
    };

    let device = Device::new(DeviceConfig::default().with_max_global_size(1024)).unwrap();
    device
        .launch(&RegisterBreadthFirst::<16>::new(), &tree, &neighbours)
        .unwrap();

    let counts: Vec<usize> = neighbours
        .counts
        .iter()
        .map(|c| c.load(Ordering::Relaxed))
        .collect();
    println!("neighbours of particle 0: {}", counts[0]);
    println!("neighbours of particle 1999: {}", counts[1999]);
    println!(
        "levels where the frontier dropped selections: {}",
        neighbours.saturated.load(Ordering::Relaxed)
    );
    for program in device.programs() {
        println!("program {} {:?}", program.entry_point, program.constants);
    }
}
