//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use crate::core::Spawn;

/// Tokio-based spawner that executes admitted tasks on a tokio runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
    /// Keeps a privately built runtime alive for as long as any clone of
    /// this spawner exists.
    owned: Option<Arc<tokio::runtime::Runtime>>,
}

impl TokioSpawner {
    /// Create a spawner from an explicit tokio runtime handle.
    #[must_use]
    pub const fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Create a spawner bound to the runtime of the calling context.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Create a spawner backed by a fresh multi-threaded runtime with the
    /// given number of worker threads.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the runtime cannot be built.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(Arc::new(runtime)),
        })
    }

    /// Create a spawner backed by a fresh runtime sized to the host CPU count.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the runtime cannot be built.
    pub fn with_default_worker_threads() -> Result<Self, std::io::Error> {
        Self::with_worker_threads(num_cpus::get())
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
