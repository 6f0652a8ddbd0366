//! Filesystem helpers shared by the release and sweep paths.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

/// Default delete attempts before giving up on a stubborn entry.
pub const DEFAULT_DELETE_ATTEMPTS: u32 = 3;

/// Default pause between delete attempts, sized to the window in which a
/// just-terminated subprocess may still hold file locks.
pub const DEFAULT_DELETE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Recursively delete a file or directory.
///
/// An already-absent path is success, not an error. Transient failures
/// (a file handle not yet released by the OS) are retried up to `attempts`
/// times with `delay` between attempts before the last error is returned.
///
/// # Errors
///
/// Returns the final I/O error once the retry budget is exhausted.
pub async fn remove_path_retrying(
    path: &Path,
    attempts: u32,
    delay: Duration,
) -> std::io::Result<()> {
    let budget = attempts.max(1);
    let mut attempt = 0;
    loop {
        match remove_path(path).await {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                attempt += 1;
                if attempt >= budget {
                    return Err(err);
                }
                tracing::debug!(
                    path = %path.display(),
                    error = %err,
                    attempt,
                    "delete failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Delete one path, recursing into directories.
async fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}
