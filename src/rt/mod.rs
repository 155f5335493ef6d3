//! The process-wide scheduler (§4.1, C1).
//!
//! A single process hosts one [`Scheduler`]. It owns zero or more size-one
//! "I/O pools" (one reactor per protocol-engine instance), one shared
//! priority-aware "pipeline pool" used for protocol processing work, and one
//! shared "utility pool" for everything else (DNS resolution, background
//! cleanup). `initialize` must run before any pool is created; `shutdown`
//! tears every pool down and makes the scheduler reusable via a fresh
//! `initialize` call.

mod executor;
mod pool;

pub use executor::IoContextExecutor;
pub use pool::{IoPool, PipelinePool, UtilityPool};

use pool::IoPoolCounters;

use std::sync::{Mutex, OnceLock};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Relative scheduling priority for work submitted to the pipeline pool.
///
/// Declared lowest-to-highest so the derived [`Ord`] sorts `Realtime` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Background,
    Low,
    Normal,
    High,
    Realtime,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// A snapshot of scheduler-wide counters, grounded on
/// `thread_pool_manager::statistics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    pub total_io_pools: usize,
    pub total_io_pools_destroyed: usize,
    pub active_io_tasks: usize,
    pub pipeline_queue_size: usize,
    pub pipeline_workers: usize,
    pub utility_queue_size: usize,
    pub utility_workers: usize,
    pub is_initialized: bool,
}

struct Inner {
    io_pool_budget: usize,
    io_pool_counters: Arc<IoPoolCounters>,
    pipeline: Arc<PipelinePool>,
    utility: Arc<UtilityPool>,
}

static STATE: OnceLock<Mutex<Option<Inner>>> = OnceLock::new();

fn state() -> &'static Mutex<Option<Inner>> {
    STATE.get_or_init(|| Mutex::new(None))
}

/// The process-wide scheduler. Zero-sized: every method is an associated
/// function operating on hidden process-global state, mirroring
/// `thread_pool_manager::instance()`.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler;

impl Scheduler {
    /// Bring the scheduler up with an advisory ceiling of `io_pool_budget`
    /// concurrent I/O pools, `pipeline_workers` threads in the shared
    /// pipeline pool, and `utility_workers` threads in the shared utility
    /// pool. Idempotent: re-initializing a running scheduler is a no-op that
    /// returns `Ok(())` (no pools are recreated, no in-flight work is
    /// disturbed).
    pub fn initialize(io_pool_budget: usize, pipeline_workers: usize, utility_workers: usize) -> Result<()> {
        let mut guard = state().lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        let pipeline = Arc::new(PipelinePool::new(pipeline_workers)?);
        let utility = Arc::new(UtilityPool::new(utility_workers)?);
        *guard = Some(Inner {
            io_pool_budget,
            io_pool_counters: Arc::new(IoPoolCounters::default()),
            pipeline,
            utility,
        });
        Ok(())
    }

    /// Whether `initialize` has run and `shutdown` has not since.
    pub fn is_initialized() -> bool {
        state().lock().unwrap().is_some()
    }

    /// Tear down every pool. Blocks until each worker thread has joined.
    /// Idempotent.
    pub fn shutdown() {
        let inner = state().lock().unwrap().take();
        drop(inner);
    }

    /// Create a new size-one I/O pool bound to a single reactor, named for
    /// diagnostics. Fails with `SchedulerUninitialized` if `initialize` has
    /// not run. `io_pool_budget` is advisory: exceeding it only logs a
    /// warning, it never fails the call.
    pub fn create_io_pool(name: impl Into<String>) -> Result<IoPool> {
        let guard = state().lock().unwrap();
        let inner = guard.as_ref().ok_or_else(Error::scheduler_uninitialized)?;
        let name = name.into();
        let in_flight = inner
            .io_pool_counters
            .created
            .load(std::sync::atomic::Ordering::SeqCst)
            - inner
                .io_pool_counters
                .destroyed
                .load(std::sync::atomic::Ordering::SeqCst);
        if in_flight >= inner.io_pool_budget {
            warn!(name = %name, budget = inner.io_pool_budget, "io pool budget exceeded");
        }
        IoPool::new(name, inner.io_pool_counters.clone())
    }

    /// The shared pipeline pool. Fails with `SchedulerUninitialized` if
    /// `initialize` has not run.
    pub fn pipeline_pool() -> Result<Arc<PipelinePool>> {
        let guard = state().lock().unwrap();
        let inner = guard.as_ref().ok_or_else(Error::scheduler_uninitialized)?;
        Ok(inner.pipeline.clone())
    }

    /// The shared utility pool. Fails with `SchedulerUninitialized` if
    /// `initialize` has not run.
    pub fn utility_pool() -> Result<Arc<UtilityPool>> {
        let guard = state().lock().unwrap();
        let inner = guard.as_ref().ok_or_else(Error::scheduler_uninitialized)?;
        Ok(inner.utility.clone())
    }

    /// A snapshot of current pool sizes and queue depths.
    pub fn statistics() -> Statistics {
        let guard = state().lock().unwrap();
        match guard.as_ref() {
            None => Statistics::default(),
            Some(inner) => Statistics {
                total_io_pools: inner
                    .io_pool_counters
                    .created
                    .load(std::sync::atomic::Ordering::SeqCst),
                total_io_pools_destroyed: inner
                    .io_pool_counters
                    .destroyed
                    .load(std::sync::atomic::Ordering::SeqCst),
                active_io_tasks: 0,
                pipeline_queue_size: inner.pipeline.queue_len(),
                pipeline_workers: inner.pipeline.worker_count(),
                utility_queue_size: inner.utility.queue_len(),
                utility_workers: inner.utility.worker_count(),
                is_initialized: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The scheduler is process-global state, so these cases share one
    // lock to avoid interleaving with each other under `cargo test`'s
    // default multi-threaded runner.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn uninitialized_create_io_pool_fails() {
        let _guard = TEST_LOCK.lock().unwrap();
        Scheduler::shutdown();
        assert!(!Scheduler::is_initialized());
        assert!(Scheduler::create_io_pool("io-0").is_err());
    }

    #[test]
    fn initialize_then_shutdown_round_trips() {
        let _guard = TEST_LOCK.lock().unwrap();
        Scheduler::shutdown();
        Scheduler::initialize(8, 2, 1).unwrap();
        assert!(Scheduler::is_initialized());
        let stats = Scheduler::statistics();
        assert_eq!(stats.pipeline_workers, 2);
        assert_eq!(stats.utility_workers, 1);
        Scheduler::shutdown();
        assert!(!Scheduler::is_initialized());
    }

    #[test]
    fn initialize_is_idempotent() {
        let _guard = TEST_LOCK.lock().unwrap();
        Scheduler::shutdown();
        Scheduler::initialize(4, 1, 1).unwrap();
        Scheduler::initialize(4, 4, 4).unwrap();
        assert_eq!(Scheduler::statistics().pipeline_workers, 1);
        Scheduler::shutdown();
    }

    #[test]
    fn io_pool_counters_track_creation_and_drop() {
        let _guard = TEST_LOCK.lock().unwrap();
        Scheduler::shutdown();
        Scheduler::initialize(4, 1, 1).unwrap();

        let pool = Scheduler::create_io_pool("io-0").unwrap();
        let stats = Scheduler::statistics();
        assert_eq!(stats.total_io_pools, 1);
        assert_eq!(stats.total_io_pools_destroyed, 0);

        drop(pool);
        let stats = Scheduler::statistics();
        assert_eq!(stats.total_io_pools, 1);
        assert_eq!(stats.total_io_pools_destroyed, 1);

        Scheduler::shutdown();
    }
}
