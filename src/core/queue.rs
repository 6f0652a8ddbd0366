//! Admission-controlled task queue: bounded concurrency with bounded waiting.
//!
//! One [`AdmissionQueue`] gates one resource class of expensive
//! external-process work (media transcoding, headless rendering). At most
//! `concurrency` thunks execute at once; up to `max_waiting` admitted tasks
//! wait in FIFO order; anything beyond that is rejected synchronously with
//! [`GateError::QueueSaturated`] and the thunk is never invoked.
//!
//! The admission decision is taken under a single short
//! `parking_lot::Mutex` critical section, so two near-simultaneous
//! submissions can never both slip past a wait-room check that only one of
//! them should pass. A finishing task hands its slot directly to the head of
//! the wait queue; the running count only drops when the wait queue is empty.
//!
//! There is no cancellation hook: dropping a [`TaskHandle`] abandons the
//! result but the thunk still runs to completion. Timeout enforcement, if
//! desired, belongs to the caller around the handle.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::GateError;
use crate::util::id::JobId;

/// Abstraction for spawning admitted task futures on a runtime.
pub trait Spawn {
    /// Spawn an async task that runs to completion in the background.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Fixed admission limits for one resource class.
#[derive(Debug, Clone)]
pub struct QueueLimits {
    /// Maximum simultaneously running thunks.
    pub concurrency: usize,
    /// Maximum tasks waiting before new submissions are rejected.
    pub max_waiting: usize,
}

/// Point-in-time queue occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct QueueDepth {
    /// Thunks currently executing.
    pub running: usize,
    /// Admitted tasks waiting for a slot.
    pub waiting: usize,
}

impl QueueDepth {
    /// Whether the queue has any work in flight or waiting.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.running == 0 && self.waiting == 0
    }
}

/// Snapshot of lifetime queue counters.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct QueueStats {
    /// Tasks admitted (immediately dispatched or queued).
    pub submitted: u64,
    /// Tasks whose thunk resolved successfully.
    pub completed: u64,
    /// Tasks whose thunk rejected.
    pub failed: u64,
    /// Submissions refused with [`GateError::QueueSaturated`].
    pub rejected: u64,
}

/// Lifetime counters (lock-free atomics).
#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// A task future wrapped for background execution.
type BoxedRun = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// An admitted task parked in the wait queue.
struct QueuedTask {
    id: JobId,
    run: BoxedRun,
}

/// Mutable queue state; every mutation happens under one lock.
struct Inner {
    running: usize,
    waiting: VecDeque<QueuedTask>,
}

struct Shared<S> {
    class: String,
    limits: QueueLimits,
    inner: Mutex<Inner>,
    counters: Counters,
    spawner: S,
}

impl<S> Shared<S>
where
    S: Spawn + Send + Sync + 'static,
{
    /// Hand the freed slot to the head of the wait queue, or release it.
    fn dispatch_next(shared: &Arc<Self>) {
        let next = {
            let mut inner = shared.inner.lock();
            let next = inner.waiting.pop_front();
            if next.is_none() {
                inner.running -= 1;
            }
            next
        };
        if let Some(task) = next {
            tracing::debug!(class = %shared.class, task = %task.id, "waking queued task");
            shared.spawner.spawn(task.run);
        }
    }
}

/// Bounded admission controller for one resource class.
///
/// Cheap to clone; clones share the same queue state. See the module docs
/// for the admission policy.
pub struct AdmissionQueue<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for AdmissionQueue<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> AdmissionQueue<S>
where
    S: Spawn + Send + Sync + 'static,
{
    /// Create a queue for `class` with fixed `limits`.
    pub fn new(class: impl Into<String>, limits: QueueLimits, spawner: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                class: class.into(),
                limits,
                inner: Mutex::new(Inner {
                    running: 0,
                    waiting: VecDeque::new(),
                }),
                counters: Counters::default(),
                spawner,
            }),
        }
    }

    /// Resource class this queue gates.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.shared.class
    }

    /// Configured admission limits.
    #[must_use]
    pub fn limits(&self) -> &QueueLimits {
        &self.shared.limits
    }

    /// Current running/waiting occupancy.
    #[must_use]
    pub fn depth(&self) -> QueueDepth {
        let inner = self.shared.inner.lock();
        QueueDepth {
            running: inner.running,
            waiting: inner.waiting.len(),
        }
    }

    /// Snapshot of lifetime counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.shared.counters.snapshot()
    }

    /// Submit a unit of work.
    ///
    /// The admission decision is synchronous: with a free slot the thunk is
    /// dispatched immediately, with wait room it is queued FIFO, otherwise
    /// the call fails and the thunk is never invoked. The returned
    /// [`TaskHandle`] settles with the thunk's result on success or its
    /// rejection reason on failure; a failing thunk affects no other task.
    ///
    /// # Errors
    ///
    /// [`GateError::QueueSaturated`] when `max_waiting` tasks are already
    /// waiting.
    pub fn submit<T, F, Fut>(&self, thunk: F) -> Result<TaskHandle<T>, GateError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let id = JobId::generate();
        let (tx, rx) = oneshot::channel();
        let run = Self::wrap(Arc::clone(&self.shared), id.clone(), thunk, tx);

        let mut inner = self.shared.inner.lock();
        if inner.running < self.shared.limits.concurrency {
            inner.running += 1;
            drop(inner);
            self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(class = %self.shared.class, task = %id, "task admitted, starting");
            self.shared.spawner.spawn(run);
        } else if inner.waiting.len() < self.shared.limits.max_waiting {
            inner.waiting.push_back(QueuedTask {
                id: id.clone(),
                run,
            });
            let waiting = inner.waiting.len();
            drop(inner);
            self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(class = %self.shared.class, task = %id, waiting, "task admitted, queued");
        } else {
            let waiting = inner.waiting.len();
            drop(inner);
            self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(class = %self.shared.class, waiting, "queue saturated, rejecting submission");
            return Err(GateError::QueueSaturated {
                class: self.shared.class.clone(),
                waiting,
            });
        }

        Ok(TaskHandle { id, rx })
    }

    /// Wrap a thunk into a background future that records the outcome,
    /// frees the slot, and then settles the caller's handle.
    fn wrap<T, F, Fut>(
        shared: Arc<Shared<S>>,
        id: JobId,
        thunk: F,
        tx: oneshot::Sender<anyhow::Result<T>>,
    ) -> BoxedRun
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Box::pin(async move {
            tracing::debug!(class = %shared.class, task = %id, "task running");
            let outcome = thunk().await;
            match &outcome {
                Ok(_) => {
                    shared.counters.completed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(class = %shared.class, task = %id, "task finished");
                }
                Err(err) => {
                    shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(class = %shared.class, task = %id, error = %err, "task failed");
                }
            }
            Shared::dispatch_next(&shared);
            // The caller may have dropped its handle; the work still ran.
            let _ = tx.send(outcome);
        })
    }
}

/// Future returned by [`AdmissionQueue::submit`].
///
/// Settles with the thunk's value, its pass-through error, or a synthetic
/// error if the task terminated without producing a result. Dropping the
/// handle does not stop the underlying thunk.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: JobId,
    rx: oneshot::Receiver<anyhow::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Identifier assigned to the task at admission.
    #[must_use]
    pub const fn id(&self) -> &JobId {
        &self.id
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, GateError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(GateError::Task(err))),
            Poll::Ready(Err(_)) => Poll::Ready(Err(GateError::Task(anyhow::anyhow!(
                "task terminated before producing a result"
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}
