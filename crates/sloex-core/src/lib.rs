//! # Sloex Core
//!
//! The numerical backbone of sloexlab. This crate turns lattice optics and
//! tracked trajectories into the diagnostics used to set up third-order
//! resonant slow extraction.
//!
//! ## Pipelines
//!
//! Three independent pipelines share the coordinate transforms:
//!
//! - lattice → [`multipole`] → [`hamiltonian`]: the Kobayashi Hamiltonian
//!   as a contour field in physical phase space.
//! - beam parameters → [`steinbach`]: stopband line, synthetic ensemble,
//!   spiral step and Hardt chromaticity.
//! - trajectories → [`tune`]: per-particle sliding-window tunes.
//!
//! ## Modules
//!
//! - [`types`]: Lattice table and trajectory coordinate selector.
//! - [`transforms`]: Action-angle, normalised and physical coordinates.
//! - [`grid`]: Linear and polar sampling grids.
//! - [`multipole`]: Virtual sextupole and octupole strengths.
//! - [`hamiltonian`]: Resonance Hamiltonian contour fields.
//! - [`steinbach`]: Steinbach diagram and closed-form extraction relations.
//! - [`tune`]: NAFF-style tune extraction.
//! - [`error`]: Error type for caller mistakes and backend failures.

pub mod error;
pub mod grid;
pub mod hamiltonian;
pub mod multipole;
pub mod steinbach;
pub mod transforms;
pub mod tune;
pub mod types;

pub use error::CoreError;
