//! Background executor for the data-plane pipelines.
//!
//! All asynchronous work in the library (publish flushes and their
//! completions, pull loops, handler dispatch, ack side effects, hold
//! timers) runs on an [`Executor`]: a shared handle over a multi-threaded
//! tokio worker pool. The pool is either owned by the library
//! ([`Executor::new`]) or supplied by the caller ([`Executor::from_handle`])
//! to disable automatic background threads.

use crate::error::{Result, Status};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::broadcast;
use tracing::debug;

/// A shared handle over the worker pool driving the client's background
/// work.
///
/// Cloning is cheap; all clones refer to the same pool. [`shutdown`]
/// (explicit or on drop of the last clone) releases an owned pool without
/// blocking; pending timers resolve with CANCELLED and tasks spawned
/// afterwards are dropped.
///
/// [`shutdown`]: Executor::shutdown
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

struct Inner {
    handle: Handle,
    owned: Mutex<Option<Runtime>>,
    shutdown_tx: broadcast::Sender<()>,
    closed: AtomicBool,
}

impl Executor {
    /// Start an executor owning a worker pool with the given number of
    /// threads (at least one).
    pub fn new(worker_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("cloudq-worker")
            .enable_all()
            .build()
            .map_err(|e| Status::internal(format!("failed to start executor: {e}")))?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            inner: Arc::new(Inner {
                handle,
                owned: Mutex::new(Some(runtime)),
                shutdown_tx,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Wrap a caller-owned runtime. Shutting this executor down stops the
    /// library's timers and rejects new tasks but leaves the runtime
    /// itself running.
    pub fn from_handle(handle: Handle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                handle,
                owned: Mutex::new(None),
                shutdown_tx,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Schedule a task on the pool. Tasks scheduled after shutdown are
    /// dropped.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.closed.load(Ordering::SeqCst) {
            debug!("task dropped: executor is shut down");
            return;
        }
        self.inner.handle.spawn(task);
    }

    /// Wait for `delay` to elapse. Resolves with CANCELLED if the executor
    /// shuts down first.
    pub async fn timer(&self, delay: Duration) -> Result<()> {
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Status::cancelled("executor shut down"));
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = shutdown_rx.recv() => Err(Status::cancelled("executor shut down")),
        }
    }

    /// The underlying tokio handle.
    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    /// Shut the executor down: reject new tasks, cancel pending timers, and
    /// release the owned worker pool without waiting for in-flight tasks.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.shutdown_tx.send(());
        if let Some(runtime) = take_owned(&self.inner.owned) {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(runtime) = take_owned(&self.owned) {
            // shutdown_background is safe even when the last handle is
            // dropped from inside another runtime.
            runtime.shutdown_background();
        }
    }
}

fn take_owned(owned: &Mutex<Option<Runtime>>) -> Option<Runtime> {
    match owned.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}
