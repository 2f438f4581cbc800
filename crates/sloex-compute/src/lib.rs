//! # Sloex Compute
//!
//! Compute backend abstraction for the sloexlab diagnostics. This crate
//! provides a [`ComputeBackend`](backend::ComputeBackend) trait that isolates
//! the beam-dynamics kernels in `sloex-core` from how the work is scheduled.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (Rayon) | `cpu` (default) | Implemented |
//!
//! Long batch jobs can be interrupted through a shared [`CancelToken`]; the
//! kernels poll it at their natural work-item boundary.

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{BackendType, CancelToken, ComputeBackend, ComputeError, DeviceInfo};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
