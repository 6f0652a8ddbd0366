//! Scoped job directories for external-process work.
//!
//! Each heavyweight subprocess invocation (a headless-browser render, a
//! transcode) gets its own isolated working directory under a fixed base
//! path: [`JobDirs::allocate`] creates it, [`JobDirs::release`] deletes it.
//! Release is unconditional and idempotent; it never throws back into the
//! caller, since it typically runs on a cleanup path where an error would
//! mask the real result. Directories orphaned by a crash are reclaimed by
//! the periodic sweep (see [`crate::lifecycle::sweeper`]).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::GateError;
use crate::util::clock::now_ms;
use crate::util::fs::{
    remove_path_retrying, DEFAULT_DELETE_ATTEMPTS, DEFAULT_DELETE_RETRY_DELAY,
};
use crate::util::id::JobId;

/// Grace period between terminating an external process and deleting its
/// working directory, letting the OS release remaining file locks.
const LOCK_RELEASE_GRACE: Duration = Duration::from_millis(500);

/// One allocation of an isolated working directory.
///
/// Plain data: the allocating code path owns it exclusively until release,
/// and [`JobDirs`] retains no reference afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ScopedJob {
    id: JobId,
    dir: PathBuf,
    created_at_ms: u128,
}

impl ScopedJob {
    /// Unique job identifier; also the directory's name.
    #[must_use]
    pub const fn id(&self) -> &JobId {
        &self.id
    }

    /// Absolute path of the working directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Allocation timestamp, milliseconds since the Unix epoch.
    #[must_use]
    pub const fn created_at_ms(&self) -> u128 {
        self.created_at_ms
    }
}

/// Handle to a still-open external process tied to a job directory.
///
/// Implemented for [`tokio::process::Child`]; render engines with richer
/// teardown (close pages, then the browser) implement this themselves.
#[async_trait]
pub trait ExternalProcess: Send {
    /// Terminate the process and all of its sub-resources.
    async fn terminate(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
impl ExternalProcess for tokio::process::Child {
    async fn terminate(&mut self) -> anyhow::Result<()> {
        self.kill().await?;
        Ok(())
    }
}

/// Allocator for scoped job directories under a fixed base path.
#[derive(Debug, Clone)]
pub struct JobDirs {
    root: PathBuf,
}

impl JobDirs {
    /// Create an allocator rooted at `root`. The root itself is created by
    /// [`crate::lifecycle::Lifecycle::init`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Base path under which job directories are created.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named directory for one unit of work.
    ///
    /// # Errors
    ///
    /// [`GateError::ResourceAllocation`] when the directory cannot be
    /// created (disk full, permissions); the caller must not proceed.
    pub async fn allocate(&self) -> Result<ScopedJob, GateError> {
        let id = JobId::generate();
        let dir = self.root.join(id.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(GateError::ResourceAllocation)?;
        tracing::debug!(job = %id, dir = %dir.display(), "allocated job directory");
        Ok(ScopedJob {
            id,
            dir,
            created_at_ms: now_ms(),
        })
    }

    /// Delete the job directory.
    ///
    /// Idempotent: an already-absent directory is a no-op. Failures are
    /// retried briefly, then logged and left to the periodic sweep — they
    /// are never surfaced to the caller.
    pub async fn release(&self, job: &ScopedJob) {
        match remove_path_retrying(job.dir(), DEFAULT_DELETE_ATTEMPTS, DEFAULT_DELETE_RETRY_DELAY)
            .await
        {
            Ok(()) => tracing::debug!(job = %job.id(), "released job directory"),
            Err(err) => tracing::error!(
                job = %job.id(),
                dir = %job.dir().display(),
                error = %err,
                "failed to delete job directory, leaving it to the sweep"
            ),
        }
    }

    /// Terminate the process holding the directory, then release it.
    ///
    /// Termination failures are logged and release proceeds regardless, so
    /// a wedged subprocess cannot keep its directory pinned forever.
    pub async fn release_with<P>(&self, job: &ScopedJob, process: &mut P)
    where
        P: ExternalProcess + ?Sized,
    {
        if let Err(err) = process.terminate().await {
            tracing::error!(job = %job.id(), error = %err, "failed to terminate external process");
        }
        // File locks can outlive the process by a moment.
        tokio::time::sleep(LOCK_RELEASE_GRACE).await;
        self.release(job).await;
    }

    /// Allocate a directory, run `work` with it, and release it on every
    /// exit path (normal return or error).
    ///
    /// # Errors
    ///
    /// [`GateError::ResourceAllocation`] when allocation fails (in which
    /// case `work` never runs); otherwise `work`'s own error, passed
    /// through after the directory is released.
    pub async fn scoped<T, F, Fut>(&self, work: F) -> Result<T, GateError>
    where
        F: FnOnce(ScopedJob) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let job = self.allocate().await?;
        let keep = job.clone();
        let outcome = work(job).await;
        self.release(&keep).await;
        outcome.map_err(GateError::Task)
    }
}
