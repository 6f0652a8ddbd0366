//! Crash-recovery sweeps for abandoned directories and artifacts.
//!
//! Three filesystem populations follow the same "eventually must be
//! deleted" contract but leak through different holes:
//!
//! 1. **Job directories** under the job root — orphaned when the process
//!    died between `allocate` and `release`.
//! 2. **Leaked subprocess artifacts** in the system temp directory —
//!    profile/working directories the external tooling creates on failure
//!    paths that bypass [`crate::lifecycle::JobDirs`] entirely.
//! 3. **Upload/output artifacts** — files written by request handlers that
//!    the client may not have downloaded yet, swept on a longer threshold.
//!
//! Staleness is judged per entry by wall-clock modification-time age at the
//! moment the entry is examined, so a directory allocated moments before a
//! sweep begins is not reaped. Sweep passes are serialized with respect to
//! each other but run concurrently with `allocate`/`release`.
//!
//! Known gap: a job that legitimately runs longer than the stale-job
//! threshold has no handshake with the sweeper and can be reaped
//! mid-flight. Keep job runtimes well under `stale_job_after`; whether the
//! fix is a heartbeat or an exemption list is an open product question.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;

use crate::core::GateError;
use crate::lifecycle::scoped::JobDirs;
use crate::util::fs::{
    remove_path_retrying, DEFAULT_DELETE_ATTEMPTS, DEFAULT_DELETE_RETRY_DELAY,
};

/// Runtime sweep policy, converted from [`crate::config::SweepConfig`].
#[derive(Debug, Clone)]
pub struct SweepPolicy {
    /// Base directory holding scoped job directories.
    pub job_root: PathBuf,
    /// Upload/output artifact directory, if one is swept.
    pub uploads_dir: Option<PathBuf>,
    /// System temp directory scanned for leaked subprocess artifacts.
    pub system_temp_dir: PathBuf,
    /// Age past which an unreleased job directory is considered abandoned.
    pub stale_job_after: Duration,
    /// Age past which an upload artifact is considered abandoned.
    pub stale_upload_after: Duration,
    /// Period between sweep passes.
    pub sweep_interval: Duration,
    /// Name prefixes of artifacts the external tooling is known to leak.
    pub legacy_prefixes: Vec<String>,
}

/// Outcome of one reap pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale job directories removed from the job root.
    pub reaped_jobs: usize,
    /// Leaked subprocess artifacts removed from the system temp directory.
    pub reaped_artifacts: usize,
    /// Stale entries removed from the uploads directory.
    pub reaped_uploads: usize,
    /// Entries that could not be examined or deleted.
    pub failures: usize,
}

impl SweepReport {
    /// Total entries removed across all three populations.
    #[must_use]
    pub const fn total_reaped(&self) -> usize {
        self.reaped_jobs + self.reaped_artifacts + self.reaped_uploads
    }
}

/// Periodic reaper for the three leak populations.
pub struct Sweeper {
    policy: SweepPolicy,
    /// Serializes reap passes; `allocate`/`release` proceed concurrently.
    pass_lock: Mutex<()>,
}

impl Sweeper {
    /// Create a sweeper with the given policy.
    #[must_use]
    pub fn new(policy: SweepPolicy) -> Self {
        Self {
            policy,
            pass_lock: Mutex::new(()),
        }
    }

    /// The policy this sweeper runs under.
    #[must_use]
    pub const fn policy(&self) -> &SweepPolicy {
        &self.policy
    }

    /// One full reap pass over all three populations.
    ///
    /// Never fails: per-entry problems are logged, counted in the report,
    /// and do not abort the remainder of the pass.
    pub async fn reap_stale(&self) -> SweepReport {
        let _serialized = self.pass_lock.lock().await;
        let mut report = SweepReport::default();

        let (reaped, failed) = sweep_entries(
            &self.policy.job_root,
            self.policy.stale_job_after,
            |_| true,
            "stale job directory",
        )
        .await;
        report.reaped_jobs = reaped;
        report.failures += failed;

        let prefixes = &self.policy.legacy_prefixes;
        let (reaped, failed) = sweep_entries(
            &self.policy.system_temp_dir,
            self.policy.stale_job_after,
            |name| prefixes.iter().any(|prefix| name.starts_with(prefix)),
            "leaked subprocess artifact",
        )
        .await;
        report.reaped_artifacts = reaped;
        report.failures += failed;

        if let Some(uploads) = &self.policy.uploads_dir {
            let (reaped, failed) = sweep_entries(
                uploads,
                self.policy.stale_upload_after,
                |name| name != ".gitkeep",
                "stale upload artifact",
            )
            .await;
            report.reaped_uploads = reaped;
            report.failures += failed;
        }

        if report.total_reaped() > 0 || report.failures > 0 {
            tracing::info!(
                jobs = report.reaped_jobs,
                artifacts = report.reaped_artifacts,
                uploads = report.reaped_uploads,
                failures = report.failures,
                "sweep finished"
            );
        }
        report
    }
}

/// Remove entries of `dir` older than `threshold` whose name passes
/// `select`. Returns `(reaped, failures)`; a missing `dir` is not a failure.
async fn sweep_entries(
    dir: &Path,
    threshold: Duration,
    select: impl Fn(&str) -> bool,
    what: &str,
) -> (usize, usize) {
    let mut reaped = 0;
    let mut failures = 0;

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return (0, 0),
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "cannot scan directory");
            return (0, 1);
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "directory scan aborted");
                failures += 1;
                break;
            }
        };

        let name = entry.file_name();
        if !select(&name.to_string_lossy()) {
            continue;
        }

        let path = entry.path();
        match entry_age(&path).await {
            Ok(Some(age)) if age > threshold => {
                match remove_path_retrying(&path, DEFAULT_DELETE_ATTEMPTS, DEFAULT_DELETE_RETRY_DELAY)
                    .await
                {
                    Ok(()) => {
                        tracing::info!(
                            path = %path.display(),
                            age_secs = age.as_secs(),
                            "reaped {what}"
                        );
                        reaped += 1;
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "failed to reap {what}");
                        failures += 1;
                    }
                }
            }
            // Fresh, or mtime in the future: keep.
            Ok(_) => {}
            Err(err) => {
                // The entry may simply be gone already.
                tracing::debug!(path = %path.display(), error = %err, "cannot stat entry");
                failures += 1;
            }
        }
    }

    (reaped, failures)
}

/// Wall-clock age of a path from its last-modified time. `Ok(None)` when
/// the filesystem reports a modification time in the future.
async fn entry_age(path: &Path) -> std::io::Result<Option<Duration>> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    let modified = meta.modified()?;
    Ok(SystemTime::now().duration_since(modified).ok())
}

/// Process-wide lifecycle: job directory allocator plus periodic sweeper.
pub struct Lifecycle {
    dirs: JobDirs,
    sweeper: Arc<Sweeper>,
    timer: tokio::task::JoinHandle<()>,
}

impl Lifecycle {
    /// One-time startup. Must run before the first
    /// [`JobDirs::allocate`] call: ensures the job root exists, reclaims
    /// leftovers from prior process lifetimes, and schedules the periodic
    /// sweep.
    ///
    /// # Errors
    ///
    /// [`GateError::ResourceAllocation`] when the job root cannot be
    /// created.
    pub async fn init(policy: SweepPolicy) -> Result<Self, GateError> {
        tokio::fs::create_dir_all(&policy.job_root)
            .await
            .map_err(GateError::ResourceAllocation)?;
        tracing::info!(
            job_root = %policy.job_root.display(),
            interval_secs = policy.sweep_interval.as_secs(),
            "lifecycle manager starting"
        );

        let dirs = JobDirs::new(policy.job_root.clone());
        let sweeper = Arc::new(Sweeper::new(policy));

        // Crash recovery from previous runs.
        let startup = sweeper.reap_stale().await;
        tracing::info!(
            reaped = startup.total_reaped(),
            failures = startup.failures,
            "startup sweep complete"
        );

        let timer = Self::spawn_periodic(Arc::clone(&sweeper));
        Ok(Self {
            dirs,
            sweeper,
            timer,
        })
    }

    /// The job directory allocator bound to this lifecycle's root.
    #[must_use]
    pub const fn dirs(&self) -> &JobDirs {
        &self.dirs
    }

    /// Trigger a reap pass outside the regular schedule.
    pub async fn reap_now(&self) -> SweepReport {
        self.sweeper.reap_stale().await
    }

    fn spawn_periodic(sweeper: Arc<Sweeper>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(sweeper.policy().sweep_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; init already swept.
            tick.tick().await;
            loop {
                tick.tick().await;
                sweeper.reap_stale().await;
            }
        })
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        // Stops the periodic timer; process exit handles anything else.
        self.timer.abort();
    }
}
