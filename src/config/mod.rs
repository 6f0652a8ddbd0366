//! Configuration models for queues and sweeps.

pub mod gate;

pub use gate::{GateConfig, QueueConfig, SweepConfig};
