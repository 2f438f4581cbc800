//! Conversions between action-angle, normalised and physical phase space.
//!
//! For a horizontal tune $\nu$ the normalised coordinates are
//!
//! $$ w = \sqrt{2J/\nu}\cos\phi, \qquad \dot w = \sqrt{2\nu J}\sin\phi $$
//!
//! and the physical coordinates at a point with Twiss functions
//! $(\alpha, \beta)$ follow from
//!
//! $$ x = \sqrt{\beta}\,w, \qquad x' = \frac{\dot w}{\nu\sqrt{\beta}} - \frac{\alpha w}{\sqrt{\beta}}. $$

use ndarray::{Array2, Zip};

use crate::error::CoreError;

/// Map an action-angle pair to normalised coordinates `(w, ẇ)`.
pub fn action_angle_to_normalized(j: f64, phi: f64, tune: f64) -> (f64, f64) {
    let w = (2.0 * j / tune).sqrt() * phi.cos();
    let wdot = (2.0 * tune * j).sqrt() * phi.sin();
    (w, wdot)
}

/// Rotate a resonance-frame angle and Hamiltonian value back to the lattice
/// frame at an observation point `mux_total` radians downstream.
///
/// Returns `(phi', H')` with
/// `phi' = phi + (tune - detuning)/tune · mux_total` and
/// `H' = H + (tune - detuning)·j`.
pub fn rotate_phase(
    j: f64,
    phi: f64,
    h: f64,
    tune: f64,
    detuning: f64,
    mux_total: f64,
) -> (f64, f64) {
    let resonant = tune - detuning;
    (phi + resonant / tune * mux_total, h + resonant * j)
}

/// Beta values that cannot be used to scale normalised coordinates.
fn is_degenerate_beta(beta: f64) -> bool {
    !beta.is_finite() || beta <= 0.0
}

/// Map normalised coordinates to physical `(x, x')`.
///
/// Fails with [`CoreError::DegenerateOptics`] when `beta` is zero, negative
/// or non-finite.
pub fn normalized_to_physical(
    w: f64,
    wdot: f64,
    tune: f64,
    alpha: f64,
    beta: f64,
) -> Result<(f64, f64), CoreError> {
    if is_degenerate_beta(beta) {
        return Err(CoreError::DegenerateOptics { beta });
    }
    let sqrt_beta = beta.sqrt();
    let x = sqrt_beta * w;
    let xp = wdot / (tune * sqrt_beta) - alpha * w / sqrt_beta;
    Ok((x, xp))
}

/// Physical coordinates over a whole grid.
///
/// A degenerate beta does not abort the conversion: `x` is still
/// `sqrt(beta)·w` and every `x'` cell is NaN.
#[derive(Debug, Clone)]
pub enum Projection {
    Valid { x: Array2<f64>, xp: Array2<f64> },
    DegenerateOptics { x: Array2<f64>, xp: Array2<f64>, beta: f64 },
}

impl Projection {
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Projection::DegenerateOptics { .. })
    }

    pub fn into_parts(self) -> (Array2<f64>, Array2<f64>) {
        match self {
            Projection::Valid { x, xp } | Projection::DegenerateOptics { x, xp, .. } => (x, xp),
        }
    }
}

/// Grid form of [`normalized_to_physical`].
pub fn normalized_to_physical_grid(
    w: &Array2<f64>,
    wdot: &Array2<f64>,
    tune: f64,
    alpha: f64,
    beta: f64,
) -> Projection {
    let sqrt_beta = beta.sqrt();
    let x = w.mapv(|v| sqrt_beta * v);

    if is_degenerate_beta(beta) {
        log::warn!("Degenerate optics (beta = {beta}); momentum coordinates set to NaN");
        return Projection::DegenerateOptics {
            xp: Array2::from_elem(x.raw_dim(), f64::NAN),
            x,
            beta,
        };
    }

    let mut xp = Array2::zeros(w.raw_dim());
    Zip::from(&mut xp)
        .and(w)
        .and(wdot)
        .for_each(|xp, &w, &wdot| *xp = wdot / (tune * sqrt_beta) - alpha * w / sqrt_beta);
    Projection::Valid { x, xp }
}
