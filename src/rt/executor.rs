//! Scoped binding of one reactor ([`super::IoPool`]) to one running engine
//! loop, with idempotent start/stop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::oneshot;

use super::IoPool;
use crate::error::Result;

/// Drives a protocol engine's read/write loop on a dedicated [`IoPool`].
///
/// `start` spawns a native thread that blocks the `IoPool`'s single-thread
/// runtime on the supplied future until `stop` fires or the future finishes
/// on its own. Calling `start` while already running, or `stop` while
/// already stopped, is a no-op.
pub struct IoContextExecutor {
    pool: IoPool,
    running: AtomicBool,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    join: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl IoContextExecutor {
    /// Bind a fresh executor to `pool`. The pool is not yet driven; call
    /// [`IoContextExecutor::start`] to begin running.
    pub fn new(pool: IoPool) -> IoContextExecutor {
        IoContextExecutor {
            pool,
            running: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
            join: Mutex::new(None),
        }
    }

    /// The bound pool's name, for diagnostics.
    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }

    /// A handle to the bound pool's runtime, for spawning auxiliary tasks
    /// onto the same reactor.
    pub fn handle(&self) -> tokio::runtime::Handle {
        self.pool.handle()
    }

    /// Start driving `fut` on the bound reactor. A no-op if already running.
    pub fn start<F>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (stop_tx, stop_rx) = oneshot::channel();
        *self.stop_tx.lock().unwrap() = Some(stop_tx);

        let handle = self.pool.handle();
        let join = std::thread::Builder::new()
            .name(format!("netrt-exec-{}", self.pool.name()))
            .spawn(move || {
                handle.block_on(async move {
                    tokio::select! {
                        _ = fut => {}
                        _ = stop_rx => {}
                    }
                });
            })
            .expect("spawning the executor thread");
        *self.join.lock().unwrap() = Some(join);
        Ok(())
    }

    /// Stop the running loop and join its thread. A no-op if not running.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.stop_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.lock().unwrap().take() {
            let _ = join.join();
        }
    }

    /// Whether `start` has been called without a matching `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for IoContextExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn start_stop_is_idempotent_and_runs_once() {
        let pool = IoPool::new("test".into(), Arc::new(super::pool::IoPoolCounters::default())).unwrap();
        let exec = IoContextExecutor::new(pool);
        let ticks = Arc::new(AtomicU32::new(0));
        let t = ticks.clone();

        exec.start(async move {
            loop {
                t.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .unwrap();
        exec.start(async {}).unwrap(); // no-op, already running
        assert!(exec.is_running());

        std::thread::sleep(std::time::Duration::from_millis(30));
        exec.stop();
        exec.stop(); // no-op, already stopped
        assert!(!exec.is_running());
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }
}
