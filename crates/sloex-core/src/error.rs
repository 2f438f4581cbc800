//! Error types for the numerical core.
//!
//! Only caller mistakes and backend failures surface as [`CoreError`].
//! Degenerate *data* (a missing element, zero beta, a window with too little
//! history, a lattice without multipoles) is represented in the returned
//! values instead.

use sloex_compute::ComputeError;
use thiserror::Error;

/// Errors that can occur in the core pipelines.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Element '{element}' not found in lattice")]
    ElementNotFound { element: String },

    #[error("Degenerate optics: beta = {beta}")]
    DegenerateOptics { beta: f64 },

    #[error("Duplicate element identifier '{0}' in lattice")]
    DuplicateElement(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("Compute backend error: {0}")]
    Compute(#[from] ComputeError),
}
