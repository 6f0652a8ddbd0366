//! Core admission-control abstractions.

pub mod error;
pub mod gate;
pub mod queue;

pub use error::{AppResult, GateError};
pub use gate::{JobGate, MEDIA_CLASS, RENDER_CLASS};
pub use queue::{AdmissionQueue, QueueDepth, QueueLimits, QueueStats, Spawn, TaskHandle};
