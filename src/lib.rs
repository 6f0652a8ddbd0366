//! # FileForge Gate
//!
//! Admission control and external-resource lifecycle for the FileForge
//! file-conversion service.
//!
//! The conversion backend shells out to heavyweight subprocesses — ffmpeg
//! for media transcoding, a headless browser for document rendering. On the
//! small hosts the service runs on, spawning those without a bound crashes
//! the machine long before the CPU is the problem. This crate is the layer
//! between the HTTP controllers and that external work:
//!
//! - **Admission-controlled queues** ([`core::AdmissionQueue`], one per
//!   resource class): at most N thunks run at once, a bounded number wait
//!   in FIFO order, and everything past the wait room is rejected
//!   immediately with a retry-later error that maps to HTTP 503.
//! - **Scoped resource lifecycle** ([`lifecycle::JobDirs`] and
//!   [`lifecycle::Sweeper`]): every subprocess invocation gets an isolated
//!   working directory that is deleted exactly once on every exit path,
//!   and a periodic sweep reclaims directories, leaked subprocess
//!   artifacts, and stale uploads abandoned by crashes.
//!
//! ## Gating a unit of work
//!
//! ```rust,ignore
//! use fileforge_gate::config::GateConfig;
//! use fileforge_gate::core::{JobGate, MEDIA_CLASS};
//!
//! let gate = JobGate::from_config(&GateConfig::from_env()?)?;
//!
//! // Controllers submit a thunk; the handle settles with its result.
//! let handle = gate.submit(MEDIA_CLASS, move || async move {
//!     transcode(&input, &output).await
//! })?;
//! let transcoded = handle.await?;
//! ```
//!
//! ## Scoped subprocess directories
//!
//! ```rust,ignore
//! use fileforge_gate::lifecycle::Lifecycle;
//!
//! // Once at startup: first sweep + periodic timer.
//! let lifecycle = Lifecycle::init(cfg.sweep.policy()).await?;
//!
//! // Per request: directory released on success *and* failure.
//! let pdf = lifecycle.dirs().scoped(|job| async move {
//!     render_markdown(job.dir(), &source).await
//! }).await?;
//! ```
//!
//! For complete examples, see `tests/admission_test.rs` and
//! `tests/lifecycle_test.rs`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core admission-control abstractions: queues, registry, errors.
pub mod core;
/// Configuration models for queues and sweeps.
pub mod config;
/// Scoped external-resource lifecycle: job directories and sweeps.
pub mod lifecycle;
/// Runtime adapters for task spawning.
pub mod runtime;
/// Shared utilities.
pub mod util;
