//! Pool kinds owned by the [`super::Scheduler`]: size-one I/O pools, the
//! shared priority-aware pipeline pool, and the shared utility pool.
//!
//! None of these run a custom work-stealing executor; they wrap
//! `tokio::runtime::Runtime`s the way `thread_pool_manager` wraps native OS
//! thread pools, and the pipeline pool layers a small priority dispatcher on
//! top since tokio's own scheduler has no notion of task priority.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{Error, Result};
use super::Priority;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Cumulative create/destroy counts for I/O pools, shared by every `IoPool`
/// handed out by the scheduler so `Statistics` can report both.
#[derive(Default)]
pub(super) struct IoPoolCounters {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
}

/// A dedicated single-thread reactor, bound to exactly one protocol-engine
/// instance at a time via [`super::IoContextExecutor`].
pub struct IoPool {
    name: String,
    runtime: Runtime,
    counters: Arc<IoPoolCounters>,
}

impl IoPool {
    pub(super) fn new(name: String, counters: Arc<IoPoolCounters>) -> Result<IoPool> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name(format!("netrt-io-{name}"))
            .build()
            .map_err(|e| Error::pool_creation_failed().with_cause(e))?;
        counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(IoPool { name, runtime, counters })
    }

    /// The name this pool was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tokio runtime handle backing this pool's reactor.
    pub fn handle(&self) -> tokio::runtime::Handle {
        self.runtime.handle().clone()
    }

    /// Run `fut` to completion on this pool's reactor, blocking the calling
    /// thread. Used by [`super::IoContextExecutor`] to drive one engine loop.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// The shared, priority-capable pool used for protocol processing work
/// (frame parsing, HPACK encode/decode, gRPC (de)serialization).
pub struct PipelinePool {
    worker_count: usize,
    runtime: Runtime,
    queued: std::sync::Arc<AtomicUsize>,
    senders: [UnboundedSender<Job>; 5],
}

const PRIORITIES: [Priority; 5] = [
    Priority::Realtime,
    Priority::High,
    Priority::Normal,
    Priority::Low,
    Priority::Background,
];

impl PipelinePool {
    pub(super) fn new(worker_count: usize) -> Result<PipelinePool> {
        let worker_count = worker_count.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_count)
            .thread_name("netrt-pipeline")
            .enable_all()
            .build()
            .map_err(|e| Error::pool_creation_failed().with_cause(e))?;

        let (realtime_tx, realtime_rx) = mpsc::unbounded_channel();
        let (high_tx, high_rx) = mpsc::unbounded_channel();
        let (normal_tx, normal_rx) = mpsc::unbounded_channel();
        let (low_tx, low_rx) = mpsc::unbounded_channel();
        let (background_tx, background_rx) = mpsc::unbounded_channel();

        let queued = std::sync::Arc::new(AtomicUsize::new(0));
        runtime.handle().spawn(dispatch_loop(
            queued.clone(),
            realtime_rx,
            high_rx,
            normal_rx,
            low_rx,
            background_rx,
        ));

        Ok(PipelinePool {
            worker_count,
            runtime,
            queued,
            senders: [realtime_tx, high_tx, normal_tx, low_tx, background_tx],
        })
    }

    /// Submit `fut` at `priority`. Higher-priority work is handed to the
    /// runtime ahead of lower-priority work queued before it, but work
    /// already running is never preempted.
    pub fn spawn<F>(&self, priority: Priority, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let index = PRIORITIES.iter().position(|p| *p == priority).unwrap();
        self.queued.fetch_add(1, Ordering::SeqCst);
        // A closed receiver means the dispatcher task (and its runtime) has
        // shut down; dropping the job silently is the right behavior for a
        // pool that is going away.
        let _ = self.senders[index].send(Box::pin(fut));
    }

    /// Number of worker threads backing this pool.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of jobs submitted but not yet picked up by the dispatcher.
    pub fn queue_len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

async fn dispatch_loop(
    queued: std::sync::Arc<AtomicUsize>,
    mut realtime_rx: UnboundedReceiver<Job>,
    mut high_rx: UnboundedReceiver<Job>,
    mut normal_rx: UnboundedReceiver<Job>,
    mut low_rx: UnboundedReceiver<Job>,
    mut background_rx: UnboundedReceiver<Job>,
) {
    loop {
        let job = tokio::select! {
            biased;
            Some(job) = realtime_rx.recv() => job,
            Some(job) = high_rx.recv() => job,
            Some(job) = normal_rx.recv() => job,
            Some(job) = low_rx.recv() => job,
            Some(job) = background_rx.recv() => job,
            else => return,
        };
        queued.fetch_sub(1, Ordering::SeqCst);
        tokio::spawn(job);
    }
}

/// The shared pool for work with no priority semantics: DNS resolution,
/// background cleanup, timer housekeeping.
pub struct UtilityPool {
    worker_count: usize,
    runtime: Runtime,
    queued: std::sync::Arc<AtomicUsize>,
    sender: UnboundedSender<Job>,
}

impl UtilityPool {
    pub(super) fn new(worker_count: usize) -> Result<UtilityPool> {
        let worker_count = worker_count.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_count)
            .thread_name("netrt-utility")
            .enable_all()
            .build()
            .map_err(|e| Error::pool_creation_failed().with_cause(e))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let queued = std::sync::Arc::new(AtomicUsize::new(0));
        let queued_for_loop = queued.clone();
        runtime.handle().spawn(async move {
            while let Some(job) = rx.recv().await {
                queued_for_loop.fetch_sub(1, Ordering::SeqCst);
                tokio::spawn(job);
            }
        });

        Ok(UtilityPool {
            worker_count,
            runtime,
            queued,
            sender: tx,
        })
    }

    /// Submit `fut` for execution.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.queued.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(Box::pin(fut));
    }

    /// Number of worker threads backing this pool.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of jobs submitted but not yet picked up by the dispatcher.
    pub fn queue_len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(super) fn handle(&self) -> tokio::runtime::Handle {
        self.runtime.handle().clone()
    }
}
