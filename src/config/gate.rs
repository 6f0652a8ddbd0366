//! Queue and sweep configuration structures.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::gate::{MEDIA_CLASS, RENDER_CLASS};
use crate::core::QueueLimits;
use crate::lifecycle::SweepPolicy;

/// Admission limits for one resource class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum concurrently running tasks.
    pub concurrency: usize,
    /// Maximum waiting tasks before new submissions are rejected.
    pub max_waiting: usize,
}

impl Default for QueueConfig {
    /// Strict limits keep heavyweight subprocesses from overwhelming a
    /// low-memory host.
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_waiting: 20,
        }
    }
}

impl QueueConfig {
    /// Validate queue configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".into());
        }
        if self.max_waiting == 0 {
            return Err("max_waiting must be greater than 0".into());
        }
        Ok(())
    }

    /// Convert into the runtime limits consumed by the queue.
    #[must_use]
    pub const fn limits(&self) -> QueueLimits {
        QueueLimits {
            concurrency: self.concurrency,
            max_waiting: self.max_waiting,
        }
    }
}

/// Stale-resource sweep configuration. Durations are seconds; see
/// [`SweepPolicy`] for the runtime form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Base directory for scoped job directories.
    pub job_root: PathBuf,
    /// Upload/output artifact directory swept on the long threshold.
    #[serde(default)]
    pub uploads_dir: Option<PathBuf>,
    /// System temp directory scanned for leaked subprocess artifacts.
    #[serde(default = "default_system_temp")]
    pub system_temp_dir: PathBuf,
    /// Age in seconds after which an unreleased job directory is reaped.
    pub stale_job_secs: u64,
    /// Age in seconds after which an upload artifact is reaped.
    pub stale_upload_secs: u64,
    /// Seconds between periodic sweep passes.
    pub sweep_interval_secs: u64,
    /// Leaked artifact name prefixes removed from the system temp
    /// directory.
    #[serde(default = "default_legacy_prefixes")]
    pub legacy_prefixes: Vec<String>,
}

fn default_system_temp() -> PathBuf {
    std::env::temp_dir()
}

fn default_legacy_prefixes() -> Vec<String> {
    // Profile directories leaked by headless Chromium on abnormal exit,
    // plus ImageMagick scratch files.
    vec![
        ".org.chromium.Chromium.".into(),
        ".com.google.Chrome.".into(),
        "Magick-".into(),
    ]
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            job_root: std::env::temp_dir().join("fileforge-jobs"),
            uploads_dir: None,
            system_temp_dir: default_system_temp(),
            stale_job_secs: 15 * 60,
            stale_upload_secs: 60 * 60,
            sweep_interval_secs: 10 * 60,
            legacy_prefixes: default_legacy_prefixes(),
        }
    }
}

impl SweepConfig {
    /// Validate sweep configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.job_root.as_os_str().is_empty() {
            return Err("job_root must not be empty".into());
        }
        if self.stale_job_secs == 0 {
            return Err("stale_job_secs must be greater than 0".into());
        }
        if self.stale_upload_secs < self.stale_job_secs {
            return Err("stale_upload_secs must not be shorter than stale_job_secs".into());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Convert into the runtime policy consumed by the sweeper.
    #[must_use]
    pub fn policy(&self) -> SweepPolicy {
        SweepPolicy {
            job_root: self.job_root.clone(),
            uploads_dir: self.uploads_dir.clone(),
            system_temp_dir: self.system_temp_dir.clone(),
            stale_job_after: Duration::from_secs(self.stale_job_secs),
            stale_upload_after: Duration::from_secs(self.stale_upload_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            legacy_prefixes: self.legacy_prefixes.clone(),
        }
    }
}

/// Root configuration: admission queues plus sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Map of resource class to queue limits.
    pub queues: HashMap<String, QueueConfig>,
    /// Stale-resource sweep settings.
    pub sweep: SweepConfig,
}

impl Default for GateConfig {
    /// The service's two resource classes with their production limits.
    fn default() -> Self {
        let mut queues = HashMap::new();
        queues.insert(MEDIA_CLASS.to_string(), QueueConfig::default());
        queues.insert(RENDER_CLASS.to_string(), QueueConfig::default());
        Self {
            queues,
            sweep: SweepConfig::default(),
        }
    }
}

impl GateConfig {
    /// Validate all queues and the sweep settings.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.queues.is_empty() {
            return Err("at least one queue must be defined".into());
        }
        for (class, queue) in &self.queues {
            queue
                .validate()
                .map_err(|e| format!("queue `{class}` invalid: {e}"))?;
        }
        self.sweep.validate()
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overridden by `FILEFORGE_*`
    /// environment variables, loading a `.env` file first if present.
    ///
    /// Recognized variables: `FILEFORGE_MEDIA_CONCURRENCY`,
    /// `FILEFORGE_RENDER_CONCURRENCY`, `FILEFORGE_MAX_WAITING`,
    /// `FILEFORGE_JOB_ROOT`, `FILEFORGE_UPLOADS_DIR`,
    /// `FILEFORGE_STALE_JOB_SECS`, `FILEFORGE_STALE_UPLOAD_SECS`,
    /// `FILEFORGE_SWEEP_INTERVAL_SECS`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first unparseable or invalid value.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let mut cfg = Self::default();
        if let Some(concurrency) = env_parse::<usize>("FILEFORGE_MEDIA_CONCURRENCY")? {
            if let Some(queue) = cfg.queues.get_mut(MEDIA_CLASS) {
                queue.concurrency = concurrency;
            }
        }
        if let Some(concurrency) = env_parse::<usize>("FILEFORGE_RENDER_CONCURRENCY")? {
            if let Some(queue) = cfg.queues.get_mut(RENDER_CLASS) {
                queue.concurrency = concurrency;
            }
        }
        if let Some(max_waiting) = env_parse::<usize>("FILEFORGE_MAX_WAITING")? {
            for queue in cfg.queues.values_mut() {
                queue.max_waiting = max_waiting;
            }
        }
        if let Some(root) = env_string("FILEFORGE_JOB_ROOT") {
            cfg.sweep.job_root = PathBuf::from(root);
        }
        if let Some(uploads) = env_string("FILEFORGE_UPLOADS_DIR") {
            cfg.sweep.uploads_dir = Some(PathBuf::from(uploads));
        }
        if let Some(secs) = env_parse::<u64>("FILEFORGE_STALE_JOB_SECS")? {
            cfg.sweep.stale_job_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("FILEFORGE_STALE_UPLOAD_SECS")? {
            cfg.sweep.stale_upload_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("FILEFORGE_SWEEP_INTERVAL_SECS")? {
            cfg.sweep.sweep_interval_secs = secs;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

/// Read and parse an environment variable, absent-is-`None`.
fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    env_string(name)
        .map(|raw| raw.trim().parse().map_err(|e| format!("{name}: {e}")))
        .transpose()
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = GateConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.queues.len(), 2);
        assert_eq!(cfg.queues[MEDIA_CLASS].concurrency, 2);
        assert_eq!(cfg.queues[RENDER_CLASS].max_waiting, 20);
        assert_eq!(cfg.sweep.stale_job_secs, 900);
        assert_eq!(cfg.sweep.stale_upload_secs, 3600);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut cfg = GateConfig::default();
        cfg.queues.get_mut(MEDIA_CLASS).unwrap().concurrency = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("media"), "error names the queue: {err}");
    }

    #[test]
    fn upload_threshold_shorter_than_job_threshold_is_rejected() {
        let mut cfg = GateConfig::default();
        cfg.sweep.stale_upload_secs = cfg.sweep.stale_job_secs - 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_roundtrip_parses_and_validates() {
        let json = r#"{
            "queues": {
                "media": { "concurrency": 2, "max_waiting": 20 },
                "render": { "concurrency": 1, "max_waiting": 5 }
            },
            "sweep": {
                "job_root": "/tmp/fileforge-jobs",
                "uploads_dir": "/srv/uploads",
                "stale_job_secs": 900,
                "stale_upload_secs": 3600,
                "sweep_interval_secs": 600
            }
        }"#;
        let cfg = GateConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.queues["render"].max_waiting, 5);
        assert_eq!(
            cfg.sweep.uploads_dir.as_deref(),
            Some(std::path::Path::new("/srv/uploads"))
        );
        // Unspecified fields pick up defaults.
        assert_eq!(cfg.sweep.legacy_prefixes.len(), 3);
    }

    #[test]
    fn invalid_json_is_reported_as_parse_error() {
        let err = GateConfig::from_json_str("{").unwrap_err();
        assert!(err.starts_with("parse error"));
    }

    #[test]
    fn env_overrides_apply() {
        std::env::set_var("FILEFORGE_STALE_JOB_SECS", "120");
        std::env::set_var("FILEFORGE_MAX_WAITING", "7");
        let cfg = GateConfig::from_env().unwrap();
        std::env::remove_var("FILEFORGE_STALE_JOB_SECS");
        std::env::remove_var("FILEFORGE_MAX_WAITING");

        assert_eq!(cfg.sweep.stale_job_secs, 120);
        assert!(cfg.queues.values().all(|q| q.max_waiting == 7));
    }

    #[test]
    fn queue_config_converts_to_limits() {
        let qc = QueueConfig {
            concurrency: 3,
            max_waiting: 9,
        };
        let limits = qc.limits();
        assert_eq!(limits.concurrency, 3);
        assert_eq!(limits.max_waiting, 9);
    }
}
