//! Deferred listener delivery.
//!
//! Notifications are never invoked while the session lock is held. Instead they are
//! posted as [`Task`]s onto a caller-supplied [`DispatchQueue`], which runs them later
//! and in posting order.
//!
//! Two queue implementations are provided:
//!
//! - [`TokioDispatchQueue`]: a channel drained by one spawned tokio task
//! - [`ManualDispatchQueue`]: tasks accumulate until the owner calls
//!   [`ManualDispatchQueue::run_pending`], for deterministic embedding and tests
//!
//! [`Dispatcher`] wraps every posted task with a delivery-time check of the session's
//! closed flag, so a notification scheduled before `close()` never reaches a listener
//! if it runs after.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// A unit of deferred listener work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Sequential "run later, in order" task queue.
pub trait DispatchQueue: Send + Sync {
    /// Schedule `task` to run after every task posted before it.
    fn post(&self, task: Task);
}

// =============================================================================
// TokioDispatchQueue
// =============================================================================

/// Dispatch queue backed by an unbounded channel and a single worker task.
pub struct TokioDispatchQueue {
    tx: mpsc::UnboundedSender<Task>,
}

impl TokioDispatchQueue {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn spawn() -> Arc<Self> {
        Self::spawn_on(&tokio::runtime::Handle::current())
    }

    /// Spawn the worker on an explicit runtime handle.
    pub fn spawn_on(handle: &tokio::runtime::Handle) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            while let Some(task) = rx.recv().await {
                task();
            }
        });
        Arc::new(Self { tx })
    }
}

impl DispatchQueue for TokioDispatchQueue {
    fn post(&self, task: Task) {
        if self.tx.send(task).is_err() {
            warn!("Dispatch worker has stopped; dropping notification");
        }
    }
}

// =============================================================================
// ManualDispatchQueue
// =============================================================================

/// Dispatch queue that only runs tasks when asked to.
#[derive(Default)]
pub struct ManualDispatchQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl ManualDispatchQueue {
    /// Create an empty queue.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run queued tasks in order until the queue is empty, including tasks posted
    /// by the tasks themselves. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Lock released before running so tasks may post again.
            let next = self.tasks.lock().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl DispatchQueue for ManualDispatchQueue {
    fn post(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Posts notifications guarded by a shared "session closed" flag.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    closed: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Dispatcher for an open session.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once [`Dispatcher::mark_closed`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flip the closed flag. Returns `true` if this call closed it.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Post `notify`, skipping it if the session is closed when it runs.
    pub fn post<F>(&self, queue: &dyn DispatchQueue, notify: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let closed = Arc::clone(&self.closed);
        queue.post(Box::new(move || {
            if closed.load(Ordering::Acquire) {
                return;
            }
            notify();
        }));
    }

    /// Post `notify` without the closed check (close and disconnect notices).
    pub fn post_unguarded<F>(&self, queue: &dyn DispatchQueue, notify: F)
    where
        F: FnOnce() + Send + 'static,
    {
        queue.post(Box::new(notify));
    }
}
