//! Error types for gate operations.

use thiserror::Error;

/// Errors produced by the admission queues and the resource lifecycle.
#[derive(Debug, Error)]
pub enum GateError {
    /// Queue for the target resource class has no wait room left.
    #[error("server busy: `{class}` queue is full ({waiting} waiting), try again later")]
    QueueSaturated {
        /// Resource class whose queue rejected the submission.
        class: String,
        /// Number of tasks already waiting at the time of rejection.
        waiting: usize,
    },
    /// No queue is configured for the requested resource class.
    #[error("unknown resource class: {0}")]
    UnknownClass(String),
    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A scoped job directory could not be created.
    #[error("failed to allocate job directory: {0}")]
    ResourceAllocation(#[source] std::io::Error),
    /// Pass-through failure from the submitted unit of work.
    #[error(transparent)]
    Task(#[from] anyhow::Error),
}

impl GateError {
    /// HTTP status the boundary layer should map this error to.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::QueueSaturated { .. } => 503,
            Self::UnknownClass(_) => 404,
            Self::Config(_) | Self::ResourceAllocation(_) | Self::Task(_) => 500,
        }
    }

    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueSaturated { .. })
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturation_maps_to_503() {
        let err = GateError::QueueSaturated {
            class: "media".into(),
            waiting: 20,
        };
        assert_eq!(err.http_status(), 503);
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "server busy: `media` queue is full (20 waiting), try again later"
        );
    }

    #[test]
    fn thunk_failures_pass_through() {
        let err = GateError::from(anyhow::anyhow!("ffmpeg exited with code 1"));
        assert_eq!(err.http_status(), 500);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "ffmpeg exited with code 1");
    }

    #[test]
    fn unknown_class_maps_to_404() {
        let err = GateError::UnknownClass("gpu".into());
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.to_string(), "unknown resource class: gpu");
    }
}
