//! Scoped external-resource lifecycle: allocation, release, and
//! crash-recovery sweeps.

pub mod scoped;
pub mod sweeper;

pub use scoped::{ExternalProcess, JobDirs, ScopedJob};
pub use sweeper::{Lifecycle, SweepPolicy, SweepReport, Sweeper};
