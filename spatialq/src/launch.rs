// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Launch adapter: maps engines onto a data-parallel worker pool.
//!
//! A launch of `num_queries` queries uses a global size of `num_queries` rounded up to
//! the work-group size, optionally capped by [`DeviceConfig::max_global_size`]. Worker
//! `w` runs queries `w, w + global_size, w + 2 * global_size, ...` one after another.
//! Each work-group is one task on the device's rayon pool; workers share nothing but
//! the read-only tree and the handler.

use std::collections::HashMap;
use std::format;
use std::panic::{self, AssertUnwindSafe};
use std::string::ToString;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::vec::Vec;

use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, debug_span, trace, warn};

use crate::engine::{QueryEngine, push_tree_arguments};
use crate::error::{LaunchError, status};
use crate::handler::{KernelArgs, QueryHandler};
use crate::tree::ParticleTree;

/// Work-group size used for engines that leave the choice to the device.
pub const DEFAULT_GROUP_SIZE: usize = 256;

/// Largest work-group size a device accepts unless configured otherwise.
pub const DEFAULT_MAX_GROUP_SIZE: usize = 1024;

/// Device configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Number of pool threads; `None` uses rayon's default.
    pub num_threads: Option<usize>,
    /// Work-group size for engines without a preference.
    pub default_group_size: usize,
    /// Largest accepted work-group size.
    pub max_group_size: usize,
    /// Upper bound on the number of workers per launch.
    pub max_global_size: Option<usize>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            default_group_size: DEFAULT_GROUP_SIZE,
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
            max_global_size: None,
        }
    }
}

impl DeviceConfig {
    /// Set the number of pool threads.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set the work-group size for engines without a preference.
    pub fn with_default_group_size(mut self, group_size: usize) -> Self {
        self.default_group_size = group_size;
        self
    }

    /// Set the largest accepted work-group size.
    pub fn with_max_group_size(mut self, max_group_size: usize) -> Self {
        self.max_group_size = max_group_size;
        self
    }

    /// Cap the number of workers per launch.
    pub fn with_max_global_size(mut self, max_global_size: usize) -> Self {
        self.max_global_size = Some(max_global_size);
        self
    }
}

/// Dispatch geometry of one launch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NdRange {
    /// Total number of workers.
    pub global_size: usize,
    /// Workers per group.
    pub group_size: usize,
}

impl NdRange {
    /// Number of work-groups.
    pub const fn num_groups(&self) -> usize {
        self.global_size / self.group_size
    }
}

/// Record of one generated query program: an engine instantiated for a tree and a
/// handler type, with its compile-time constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    /// Entry point of the engine.
    pub entry_point: &'static str,
    /// Compile-time constants, e.g. `Max_selected_nodes`.
    pub constants: Vec<(&'static str, u64)>,
    /// Particle record type.
    pub particle_type: &'static str,
    /// Node attribute record types.
    pub node_types: (&'static str, &'static str),
    /// Handler type.
    pub handler_type: &'static str,
}

impl Program {
    /// Look up a constant by name.
    pub fn constant(&self, name: &str) -> Option<u64> {
        self.constants
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

type ProgramKey = (&'static str, Vec<(&'static str, u64)>);

struct Dispatch {
    program: Arc<Program>,
    range: NdRange,
    num_queries: usize,
}

/// Completion signal of an enqueued launch.
#[derive(Clone, Debug)]
pub struct Event {
    inner: Arc<EventInner>,
}

#[derive(Debug)]
struct EventInner {
    result: Mutex<Option<Result<(), LaunchError>>>,
    done: Condvar,
}

impl Event {
    fn pending() -> Self {
        Self {
            inner: Arc::new(EventInner {
                result: Mutex::new(None),
                done: Condvar::new(),
            }),
        }
    }

    /// An event that is already complete.
    pub fn completed(result: Result<(), LaunchError>) -> Self {
        let event = Self::pending();
        event.complete(result);
        event
    }

    fn complete(&self, result: Result<(), LaunchError>) {
        *self.inner.result.lock() = Some(result);
        self.inner.done.notify_all();
    }

    /// Whether the launch has finished.
    pub fn is_complete(&self) -> bool {
        self.inner.result.lock().is_some()
    }

    /// Status code of the finished launch, `None` while it is running.
    pub fn status(&self) -> Option<i32> {
        self.inner.result.lock().as_ref().map(|r| match r {
            Ok(()) => status::SUCCESS,
            Err(e) => e.status(),
        })
    }

    /// Block until the launch has finished.
    pub fn wait(&self) -> Result<(), LaunchError> {
        let mut result = self.inner.result.lock();
        loop {
            if let Some(r) = result.as_ref() {
                return r.clone();
            }
            self.inner.done.wait(&mut result);
        }
    }
}

/// A data-parallel execution device backed by a rayon thread pool.
#[derive(Debug)]
pub struct Device {
    pool: ThreadPool,
    config: DeviceConfig,
    programs: Mutex<HashMap<ProgramKey, Arc<Program>>>,
}

impl Device {
    /// Create a device and its worker pool.
    pub fn new(config: DeviceConfig) -> Result<Self, LaunchError> {
        let mut builder =
            ThreadPoolBuilder::new().thread_name(|i| format!("spatialq-worker-{i}"));
        if let Some(n) = config.num_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| LaunchError::OutOfResources(e.to_string()))?;
        debug!(
            num_threads = pool.current_num_threads(),
            "created query device"
        );
        Ok(Self {
            pool,
            config,
            programs: Mutex::new(HashMap::new()),
        })
    }

    /// The device configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Number of pool threads.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Programs built so far.
    pub fn programs(&self) -> Vec<Arc<Program>> {
        self.programs.lock().values().cloned().collect()
    }

    /// Dispatch geometry for `num_queries` queries.
    ///
    /// Fails with [`LaunchError::InvalidWorkGroupSize`] when the group size is zero or
    /// larger than [`DeviceConfig::max_group_size`].
    pub fn nd_range(
        &self,
        num_queries: usize,
        group_size: Option<usize>,
    ) -> Result<NdRange, LaunchError> {
        let group_size = group_size.unwrap_or(self.config.default_group_size);
        if group_size == 0 || group_size > self.config.max_group_size {
            return Err(LaunchError::InvalidWorkGroupSize(group_size));
        }
        let mut global_size = num_queries.div_ceil(group_size) * group_size;
        if let Some(max) = self.config.max_global_size {
            global_size = global_size.min((max / group_size).max(1) * group_size);
        }
        Ok(NdRange {
            global_size,
            group_size,
        })
    }

    /// Run all queries of `handler` and block until they finish.
    pub fn launch<E, T, H>(&self, engine: &E, tree: &T, handler: &H) -> Result<(), LaunchError>
    where
        E: QueryEngine<T, H>,
        T: ParticleTree,
        H: QueryHandler<T>,
    {
        let dispatch = self.prepare(engine, tree, handler)?;
        self.pool
            .install(|| execute(engine, tree, handler, &dispatch))
    }

    /// Submit all queries of `handler` and return without waiting.
    ///
    /// Submission errors are returned immediately; execution failures are reported by
    /// the returned [`Event`].
    pub fn enqueue<E, T, H>(
        &self,
        engine: Arc<E>,
        tree: Arc<T>,
        handler: Arc<H>,
    ) -> Result<Event, LaunchError>
    where
        E: QueryEngine<T, H> + Send + 'static,
        T: ParticleTree + Send + 'static,
        H: QueryHandler<T> + Send + 'static,
    {
        let dispatch = self.prepare(&*engine, &*tree, &*handler)?;
        if dispatch.num_queries == 0 {
            return Ok(Event::completed(Ok(())));
        }
        let event = Event::pending();
        let signal = event.clone();
        self.pool.spawn(move || {
            let result = execute(&*engine, &*tree, &*handler, &dispatch);
            signal.complete(result);
        });
        Ok(event)
    }

    fn program<E, T, H>(&self, engine: &E) -> Arc<Program>
    where
        E: QueryEngine<T, H>,
        T: ParticleTree,
        H: QueryHandler<T>,
    {
        let key = (core::any::type_name::<(E, T, H)>(), engine.constants());
        let mut programs = self.programs.lock();
        programs
            .entry(key)
            .or_insert_with_key(|(_, constants)| {
                let program = Program {
                    entry_point: E::ENTRY_POINT,
                    constants: constants.clone(),
                    particle_type: core::any::type_name::<T::Particle>(),
                    node_types: (
                        core::any::type_name::<T::Node0>(),
                        core::any::type_name::<T::Node1>(),
                    ),
                    handler_type: core::any::type_name::<H>(),
                };
                debug!(
                    entry_point = program.entry_point,
                    constants = ?program.constants,
                    handler = program.handler_type,
                    "built query program"
                );
                Arc::new(program)
            })
            .clone()
    }

    fn prepare<E, T, H>(&self, engine: &E, tree: &T, handler: &H) -> Result<Dispatch, LaunchError>
    where
        E: QueryEngine<T, H>,
        T: ParticleTree,
        H: QueryHandler<T>,
    {
        let program = self.program::<E, T, H>(engine);

        let mut args = KernelArgs::new();
        push_tree_arguments(tree, &mut args);
        handler.push_arguments(&mut args);
        if let Some(name) = args.first_duplicate() {
            return Err(LaunchError::InvalidKernelArgs(name));
        }

        let num_queries = handler.num_independent_queries();
        let range = self.nd_range(num_queries, engine.group_size())?;
        debug!(
            entry_point = program.entry_point,
            num_queries,
            global_size = range.global_size,
            group_size = range.group_size,
            num_args = args.len(),
            "enqueue query kernel"
        );
        Ok(Dispatch {
            program,
            range,
            num_queries,
        })
    }
}

fn execute<E, T, H>(
    engine: &E,
    tree: &T,
    handler: &H,
    dispatch: &Dispatch,
) -> Result<(), LaunchError>
where
    E: QueryEngine<T, H>,
    T: ParticleTree,
    H: QueryHandler<T>,
{
    let NdRange {
        global_size,
        group_size,
    } = dispatch.range;
    let num_queries = dispatch.num_queries;
    let failed = AtomicUsize::new(0);
    let _span = debug_span!(
        "execute",
        entry_point = dispatch.program.entry_point,
        num_queries
    )
    .entered();

    rayon::scope(|s| {
        for group in 0..dispatch.range.num_groups() {
            let failed = &failed;
            s.spawn(move |_| {
                for local in 0..group_size {
                    let worker = group * group_size + local;
                    if worker >= num_queries {
                        break;
                    }
                    for query_id in (worker..num_queries).step_by(global_size) {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                            engine.run_query(tree, handler, query_id);
                        }));
                        if outcome.is_err() {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                trace!(group, "work-group finished");
            });
        }
    });

    let failed = failed.into_inner();
    if failed > 0 {
        warn!(
            entry_point = dispatch.program.entry_point,
            failed,
            total = num_queries,
            "query execution failed"
        );
        return Err(LaunchError::ExecutionFailed {
            failed,
            total: num_queries,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;
    use crate::bfs::{NodeBatch, ParticleBatch, RegisterBreadthFirst};
    use crate::dfs::{DepthFirst, Relaxed, Strict};
    use crate::handler::{BfsHandler, DfsHandler};
    use crate::key::TreeKey;
    use crate::tree::{IntervalTree, interval_tree};

    /// Counts the particles each query accepts with a select-all policy.
    struct CountAll {
        num_queries: usize,
        runs: Vec<AtomicUsize>,
        accepted: Vec<AtomicUsize>,
        panic_on: Option<usize>,
        extra_arg: Option<&'static str>,
    }

    impl CountAll {
        fn new(num_queries: usize) -> Self {
            Self {
                num_queries,
                runs: (0..num_queries).map(|_| AtomicUsize::new(0)).collect(),
                accepted: (0..num_queries).map(|_| AtomicUsize::new(0)).collect(),
                panic_on: None,
                extra_arg: None,
            }
        }

        fn runs(&self) -> Vec<usize> {
            self.runs.iter().map(|r| r.load(Ordering::Relaxed)).collect()
        }

        fn accepted(&self) -> Vec<usize> {
            self.accepted
                .iter()
                .map(|r| r.load(Ordering::Relaxed))
                .collect()
        }
    }

    impl QueryHandler<IntervalTree> for CountAll {
        type State = (usize, usize);

        fn num_independent_queries(&self) -> usize {
            self.num_queries
        }

        fn push_arguments(&self, args: &mut KernelArgs) {
            args.push_buffer("results", self.num_queries);
            if let Some(name) = self.extra_arg {
                args.push_scalar(name, 1);
            }
        }

        fn at_query_init(&self, query_id: usize) -> Self::State {
            self.runs[query_id].fetch_add(1, Ordering::Relaxed);
            (query_id, 0)
        }

        fn at_query_exit(&self, query_id: usize, (_, count): Self::State) {
            self.accepted[query_id].store(count, Ordering::Relaxed);
        }
    }

    impl DfsHandler<IntervalTree> for CountAll {
        fn select_node(
            &self,
            (query_id, _): &mut Self::State,
            _: TreeKey,
            _: usize,
            _: &u32,
            _: &u32,
        ) -> bool {
            assert_ne!(Some(*query_id), self.panic_on, "query {query_id} refuses");
            true
        }

        fn process_particle(&self, (_, count): &mut Self::State, _: usize, _: &u32) -> bool {
            *count += 1;
            true
        }
    }

    impl BfsHandler<IntervalTree> for CountAll {
        fn select_nodes<const MAX: usize>(
            &self,
            _: &mut Self::State,
            batch: &mut NodeBatch<'_, IntervalTree, MAX>,
        ) {
            for c in 0..batch.available_children() {
                batch.select(c);
            }
        }

        fn process_particles<const MAX: usize>(
            &self,
            (_, count): &mut Self::State,
            batch: &ParticleBatch<'_, IntervalTree, MAX>,
        ) {
            *count += batch.len();
        }
    }

    fn device(config: DeviceConfig) -> Device {
        Device::new(config.with_num_threads(4)).unwrap()
    }

    #[test]
    fn every_query_runs_exactly_once() {
        let tree = interval_tree(37);
        for max_global in [1, 3, 16, 64, 1000] {
            let device = device(DeviceConfig::default().with_max_global_size(max_global));
            for group in [Some(1), Some(4), Some(32), None] {
                let handler = CountAll::new(101);
                let engine = DepthFirst::<Strict>::new().with_group_size(group);
                device.launch(&engine, &tree, &handler).unwrap();
                assert_eq!(handler.runs(), vec![1; 101], "max {max_global}, group {group:?}");
                assert_eq!(handler.accepted(), vec![37; 101]);
            }
        }
    }

    #[test]
    fn both_engines_count_every_particle() {
        let tree = interval_tree(50);
        let device = device(DeviceConfig::default());

        let handler = CountAll::new(10);
        device
            .launch(&RegisterBreadthFirst::<32>::new(), &tree, &handler)
            .unwrap();
        assert_eq!(handler.accepted(), vec![50; 10]);

        let handler = CountAll::new(10);
        device
            .launch(&DepthFirst::<Relaxed>::new(), &tree, &handler)
            .unwrap();
        assert_eq!(handler.accepted(), vec![50; 10]);
    }

    #[test]
    fn nd_range_rounds_and_caps() {
        let device = device(DeviceConfig::default().with_max_global_size(100));
        assert_eq!(
            device.nd_range(10, Some(8)).unwrap(),
            NdRange {
                global_size: 16,
                group_size: 8
            }
        );
        assert_eq!(device.nd_range(1000, Some(8)).unwrap().global_size, 96);
        assert_eq!(device.nd_range(1000, Some(256)).unwrap().global_size, 256);
        assert_eq!(device.nd_range(0, Some(8)).unwrap().global_size, 0);
        assert_eq!(
            device.nd_range(10, None).unwrap().group_size,
            DEFAULT_GROUP_SIZE
        );
        assert_eq!(
            device.nd_range(10, Some(0)),
            Err(LaunchError::InvalidWorkGroupSize(0))
        );
    }

    #[test]
    fn zero_group_size_is_rejected_at_submission() {
        let tree = interval_tree(8);
        let device = device(DeviceConfig::default());
        let handler = CountAll::new(4);
        let engine = RegisterBreadthFirst::<4>::new().with_group_size(0);
        let result = device.launch(&engine, &tree, &handler);
        assert_eq!(result, Err(LaunchError::InvalidWorkGroupSize(0)));
        assert_eq!(crate::error::status_of(&result), status::INVALID_WORK_GROUP_SIZE);
        assert_eq!(handler.runs(), vec![0; 4]);
    }

    #[test]
    fn oversized_group_is_rejected_at_submission() {
        let tree = interval_tree(4);
        let device = device(DeviceConfig::default());
        let handler = CountAll::new(1);
        let engine = DepthFirst::<Strict>::new().with_group_size(Some(1 << 36));
        let result = device.launch(&engine, &tree, &handler);
        assert_eq!(result, Err(LaunchError::InvalidWorkGroupSize(1 << 36)));
        assert_eq!(crate::error::status_of(&result), status::INVALID_WORK_GROUP_SIZE);
        assert_eq!(handler.runs(), vec![0]);

        let engine = DepthFirst::<Strict>::new().with_group_size(Some(DEFAULT_MAX_GROUP_SIZE));
        device.launch(&engine, &tree, &handler).unwrap();
        assert_eq!(handler.runs(), vec![1]);
    }

    #[test]
    fn wide_group_with_few_queries_finishes() {
        let tree = interval_tree(4);
        let device = device(DeviceConfig::default().with_max_group_size(1 << 40));
        let handler = CountAll::new(3);
        let engine = DepthFirst::<Relaxed>::new().with_group_size(Some(1 << 36));
        device.launch(&engine, &tree, &handler).unwrap();
        assert_eq!(handler.runs(), vec![1; 3]);
        assert_eq!(handler.accepted(), vec![4; 3]);
    }

    #[test]
    fn duplicate_kernel_argument_is_rejected() {
        let tree = interval_tree(8);
        let device = device(DeviceConfig::default());
        let mut handler = CountAll::new(4);
        handler.extra_arg = Some("num_particles");
        let result = device.launch(&DepthFirst::<Strict>::new(), &tree, &handler);
        assert_eq!(result, Err(LaunchError::InvalidKernelArgs("num_particles")));
        assert_eq!(handler.runs(), vec![0; 4]);
    }

    #[test]
    fn failing_query_does_not_stop_its_siblings() {
        let tree = interval_tree(8);
        let device = device(DeviceConfig::default().with_max_global_size(2));
        let mut handler = CountAll::new(9);
        handler.panic_on = Some(4);
        let engine = DepthFirst::<Strict>::new().with_group_size(Some(1));
        let result = device.launch(&engine, &tree, &handler);
        assert_eq!(
            result,
            Err(LaunchError::ExecutionFailed {
                failed: 1,
                total: 9
            })
        );
        let mut expected = vec![8; 9];
        expected[4] = 0;
        assert_eq!(handler.accepted(), expected);
        assert_eq!(handler.runs(), vec![1; 9]);
    }

    #[test]
    fn enqueue_signals_completion() {
        let tree = Arc::new(interval_tree(20));
        let device = device(DeviceConfig::default());
        let handler = Arc::new(CountAll::new(33));
        let event = device
            .enqueue(
                Arc::new(DepthFirst::<Strict>::new()),
                Arc::clone(&tree),
                Arc::clone(&handler),
            )
            .unwrap();
        assert_eq!(event.wait(), Ok(()));
        assert!(event.is_complete());
        assert_eq!(event.status(), Some(status::SUCCESS));
        assert_eq!(handler.accepted(), vec![20; 33]);

        let empty = device
            .enqueue(
                Arc::new(DepthFirst::<Strict>::new()),
                tree,
                Arc::new(CountAll::new(0)),
            )
            .unwrap();
        assert!(empty.is_complete());
    }

    #[test]
    fn enqueue_reports_failed_queries_through_the_event() {
        let tree = Arc::new(interval_tree(8));
        let device = device(DeviceConfig::default());
        let mut handler = CountAll::new(6);
        handler.panic_on = Some(2);
        let handler = Arc::new(handler);
        let event = device
            .enqueue(
                Arc::new(DepthFirst::<Relaxed>::new()),
                tree,
                Arc::clone(&handler),
            )
            .unwrap();
        assert_eq!(
            event.wait(),
            Err(LaunchError::ExecutionFailed {
                failed: 1,
                total: 6
            })
        );
        assert_eq!(event.status(), Some(status::EXEC_STATUS_ERROR));
        assert_eq!(event.status(), Some(-14));
        assert_eq!(handler.runs(), vec![1; 6]);
        let mut expected = vec![8; 6];
        expected[2] = 0;
        assert_eq!(handler.accepted(), expected);
    }

    #[test]
    fn programs_are_built_once_per_instantiation() {
        let tree = interval_tree(8);
        let device = device(DeviceConfig::default());
        let handler = CountAll::new(2);
        let bfs = RegisterBreadthFirst::<16>::new();
        device.launch(&bfs, &tree, &handler).unwrap();
        device.launch(&bfs, &tree, &handler).unwrap();
        device
            .launch(&DepthFirst::<Relaxed>::new(), &tree, &handler)
            .unwrap();

        let programs = device.programs();
        assert_eq!(programs.len(), 2);
        let bfs_program = programs
            .iter()
            .find(|p| p.entry_point == "register_breadth_first")
            .unwrap();
        assert_eq!(bfs_program.constant("Max_selected_nodes"), Some(16));
        assert_eq!(bfs_program.constant("group_size"), Some(256));
        let dfs_program = programs
            .iter()
            .find(|p| p.entry_point == "depth_first")
            .unwrap();
        assert_eq!(dfs_program.constant("Iteration_strategy"), Some(1));
        assert_eq!(dfs_program.particle_type, "u32");
    }
}
