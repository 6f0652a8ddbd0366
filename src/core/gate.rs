//! Per-resource-class queue registry.
//!
//! A [`JobGate`] owns one [`AdmissionQueue`] per configured resource class.
//! It is an explicit instance handed to call sites, not a process-wide
//! singleton, so tests can run several independent gates side by side.
//! Queues for different classes are fully independent; no limit is shared.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::config::GateConfig;
use crate::core::{AdmissionQueue, GateError, QueueDepth, Spawn, TaskHandle};
use crate::runtime::TokioSpawner;

/// Resource class label for media transcoding work (ffmpeg subprocesses).
pub const MEDIA_CLASS: &str = "media";

/// Resource class label for headless-browser rendering work.
pub const RENDER_CLASS: &str = "render";

/// Registry of admission queues, one per resource class.
pub struct JobGate<S> {
    queues: HashMap<String, AdmissionQueue<S>>,
}

impl JobGate<TokioSpawner> {
    /// Build a gate on the current tokio runtime from validated
    /// configuration.
    ///
    /// # Errors
    ///
    /// [`GateError::Config`] when the configuration fails validation.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn from_config(cfg: &GateConfig) -> Result<Self, GateError> {
        Self::with_spawner(cfg, TokioSpawner::current())
    }
}

impl<S> JobGate<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Build a gate from configuration with an explicit spawner.
    ///
    /// # Errors
    ///
    /// [`GateError::Config`] when the configuration fails validation.
    pub fn with_spawner(cfg: &GateConfig, spawner: S) -> Result<Self, GateError> {
        cfg.validate().map_err(GateError::Config)?;

        let queues = cfg
            .queues
            .iter()
            .map(|(class, qc)| {
                let queue = AdmissionQueue::new(class.clone(), qc.limits(), spawner.clone());
                (class.clone(), queue)
            })
            .collect();
        Ok(Self { queues })
    }

    /// Look up the queue for a resource class.
    #[must_use]
    pub fn queue(&self, class: &str) -> Option<&AdmissionQueue<S>> {
        self.queues.get(class)
    }

    /// Configured resource class labels.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }

    /// Submit a unit of work under the queue for `class`.
    ///
    /// # Errors
    ///
    /// [`GateError::UnknownClass`] when no queue is configured for `class`;
    /// [`GateError::QueueSaturated`] when that queue has no wait room left.
    pub fn submit<T, F, Fut>(&self, class: &str, thunk: F) -> Result<TaskHandle<T>, GateError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let queue = self
            .queues
            .get(class)
            .ok_or_else(|| GateError::UnknownClass(class.to_string()))?;
        queue.submit(thunk)
    }

    /// Current occupancy of every queue, keyed by class.
    #[must_use]
    pub fn depths(&self) -> HashMap<String, QueueDepth> {
        self.queues
            .iter()
            .map(|(class, queue)| (class.clone(), queue.depth()))
            .collect()
    }

    /// Spawn a periodic monitor that logs the depth of every non-idle queue.
    pub fn spawn_monitor(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let queues: Vec<AdmissionQueue<S>> = self.queues.values().cloned().collect();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                for queue in &queues {
                    let depth = queue.depth();
                    if !depth.is_idle() {
                        tracing::info!(
                            class = %queue.class(),
                            running = depth.running,
                            waiting = depth.waiting,
                            "queue depth"
                        );
                    }
                }
            }
        })
    }
}
