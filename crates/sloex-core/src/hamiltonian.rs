//! Kobayashi Hamiltonian of the third-order resonance.
//!
//! Near the resonance $3\nu_r$ the motion is described, in resonance-frame
//! action-angle variables scaled by a reference action $J_0$, by
//!
//! $$ H(r, \phi) = \delta\, r + \Omega\, r^2 + r^{n/2}\cos(n\phi), \qquad r = J/J_0, $$
//!
//! where $\delta$ is the detuning and $\Omega$ the octupole amplitude
//! detuning, both in units of the virtual sextupole. [`ResonanceHamiltonian`]
//! evaluates this field on a [`PolarGrid`] and maps every cell to physical
//! $(x, x')$ at a chosen lattice element, ready for contour rendering.

use std::sync::Arc;

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use sloex_compute::{ComputeBackend, CpuBackend};

use crate::error::CoreError;
use crate::grid::PolarGrid;
use crate::multipole::{virtual_octupole, virtual_sextupole, VirtualSextupole};
use crate::transforms::{
    action_angle_to_normalized, normalized_to_physical_grid, rotate_phase, Projection,
};
use crate::types::LatticeTable;

/// Reference action $J_0$ (m) used to normalise the radial coordinate.
pub const REFERENCE_ACTION: f64 = 2.0e-4;

/// Order of the resonance driven by the virtual sextupole.
pub const RESONANCE_ORDER: u32 = 3;

/// Empirical scaling applied to the octupole detuning term.
pub const OCTUPOLE_CORRECTION: f64 = 1.2;

/// Radial Hamiltonian $\delta r + \Omega r^2 + r^{n/2}\cos(n\phi + \phi_0)$.
pub fn radial_hamiltonian(r: f64, phi: f64, delta: f64, omega: f64, n: u32, phi0: f64) -> f64 {
    let n = n as f64;
    delta * r + omega * r * r + r.powf(n / 2.0) * (n * phi + phi0).cos()
}

/// Scaled detuning and amplitude-detuning coefficients `(δ, Ω)`.
///
/// `δ = Δν / (p̃ₙ J₀^{n/2-1})`, `Ω = p̃₄₀ / (p̃ₙ J₀^{n/2-2})`.
pub fn delta_omega(detuning: f64, p40: f64, pn: f64, j0: f64, n: u32) -> (f64, f64) {
    let half = n as f64 / 2.0;
    let delta = detuning / (pn * j0.powf(half - 1.0));
    let omega = p40 / (pn * j0.powf(half - 2.0));
    (delta, omega)
}

/// Hamiltonian in normalised Cartesian coordinates `(w, ẇ)`.
pub fn hamiltonian_cartesian(w: f64, wdot: f64, tune: f64, detuning: f64, p40: f64, p3: f64) -> f64 {
    let radius_sq = w * w + wdot * wdot / (tune * tune);
    let linear = detuning * tune / 2.0 * radius_sq;
    let detuning_term = p40 * (tune / 2.0 * radius_sq).powi(2);
    let resonance = p3 * tune.powf(1.5) / 2f64.powf(1.5) * (w.powi(3) - 3.0 * w * wdot * wdot / (tune * tune));
    linear + detuning_term + resonance
}

/// Inputs of one contour evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourParams {
    /// Working horizontal tune.
    pub tune: f64,
    /// Resonant horizontal tune.
    pub resonant_tune: f64,
    /// Lattice element at which the field is observed.
    pub element: String,
    /// Smallest radius as a power of ten.
    pub r_min_exp: f64,
    /// Largest radius as a power of ten.
    pub r_max_exp: f64,
    /// Samples along each grid axis.
    pub point_count: usize,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            tune: 1.67,
            resonant_tune: 5.0 / 3.0,
            element: "ES".into(),
            r_min_exp: -10.0,
            r_max_exp: 0.5,
            point_count: 500,
        }
    }
}

/// Hamiltonian values co-indexed with physical phase-space coordinates.
///
/// All three grids are indexed `[angle, radius]`.
#[derive(Debug, Clone)]
pub struct HamiltonianField {
    pub x: Array2<f64>,
    pub xp: Array2<f64>,
    pub h: Array2<f64>,
    /// Set when the element's beta could not scale the momentum axis.
    pub degenerate_beta: Option<f64>,
}

impl HamiltonianField {
    /// The 2×2 all-zero triple returned when no field can be built.
    pub fn empty() -> Self {
        Self {
            x: Array2::zeros((2, 2)),
            xp: Array2::zeros((2, 2)),
            h: Array2::zeros((2, 2)),
            degenerate_beta: None,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.h.dim()
    }

    /// Number of cells where any of the three grids is not finite.
    pub fn non_finite_cells(&self) -> usize {
        self.x
            .iter()
            .zip(self.xp.iter())
            .zip(self.h.iter())
            .filter(|((x, xp), h)| !(x.is_finite() && xp.is_finite() && h.is_finite()))
            .count()
    }
}

/// Result of a contour evaluation.
///
/// A missing element still yields a renderable (all-zero) field, but the
/// variant lets callers tell it apart from a genuinely flat Hamiltonian.
#[derive(Debug, Clone)]
pub enum ContourOutcome {
    Field(HamiltonianField),
    ElementNotFound { element: String, field: HamiltonianField },
}

impl ContourOutcome {
    pub fn field(&self) -> &HamiltonianField {
        match self {
            ContourOutcome::Field(field) | ContourOutcome::ElementNotFound { field, .. } => field,
        }
    }

    pub fn into_field(self) -> HamiltonianField {
        match self {
            ContourOutcome::Field(field) | ContourOutcome::ElementNotFound { field, .. } => field,
        }
    }

    pub fn is_element_missing(&self) -> bool {
        matches!(self, ContourOutcome::ElementNotFound { .. })
    }

    /// Summary of the degenerate conditions met while building the field.
    pub fn diagnostics(&self) -> ContourDiagnostics {
        let field = self.field();
        ContourDiagnostics {
            missing_element: match self {
                ContourOutcome::ElementNotFound { element, .. } => Some(element.clone()),
                ContourOutcome::Field(_) => None,
            },
            degenerate_beta: field.degenerate_beta,
            non_finite_cells: field.non_finite_cells(),
            total_cells: field.h.len(),
        }
    }
}

/// Counts of degenerate conditions in a contour evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourDiagnostics {
    pub missing_element: Option<String>,
    pub degenerate_beta: Option<f64>,
    pub non_finite_cells: usize,
    pub total_cells: usize,
}

/// Builds Kobayashi Hamiltonian contour fields for a lattice.
pub struct ResonanceHamiltonian {
    pub backend: Arc<dyn ComputeBackend>,
}

impl Default for ResonanceHamiltonian {
    fn default() -> Self {
        Self {
            backend: Arc::new(CpuBackend::new()),
        }
    }
}

impl ResonanceHamiltonian {
    pub fn new(backend: Arc<dyn ComputeBackend>) -> Self {
        Self { backend }
    }

    /// Evaluate the Hamiltonian on a polar grid and map it to physical
    /// coordinates at `params.element`.
    ///
    /// A missing element is not an error: the outcome is
    /// [`ContourOutcome::ElementNotFound`] carrying a 2×2 zero field. `Err`
    /// is only returned when the compute backend fails.
    pub fn build_contour(
        &self,
        lattice: &LatticeTable,
        params: &ContourParams,
    ) -> Result<ContourOutcome, CoreError> {
        let Some(observer) = lattice.get(&params.element) else {
            log::warn!("Element {} not found in lattice", params.element);
            return Ok(ContourOutcome::ElementNotFound {
                element: params.element.clone(),
                field: HamiltonianField::empty(),
            });
        };

        let tune = params.tune;
        let detuning = tune - params.resonant_tune;
        let VirtualSextupole { magnitude: p3, phase: phase3 } = virtual_sextupole(lattice, tune);
        let p40 = virtual_octupole(lattice, tune);
        let mux_total = -(2.0 * std::f64::consts::PI * observer.mux - phase3);

        let (delta, omega) = delta_omega(
            detuning,
            OCTUPOLE_CORRECTION * p40,
            p3,
            REFERENCE_ACTION,
            RESONANCE_ORDER,
        );
        if p3 == 0.0 {
            log::warn!("Virtual sextupole strength is zero; Hamiltonian is not finite");
        }

        let grid = PolarGrid::new(params.r_min_exp, params.r_max_exp, params.point_count);
        let (rows, cols) = grid.shape();
        log::debug!(
            "Contour at {}: {}x{} cells, p3={:.4e}, p40={:.4e}, delta={:.4e}, omega={:.4e}",
            params.element, rows, cols, p3, p40, delta, omega
        );

        // Each row holds three planes side by side: [h | w | ẇ]
        let planes = self.backend.parallel_row_fill(rows, 3 * cols, &|i, out| {
            let (h_row, rest) = out.split_at_mut(cols);
            let (w_row, wdot_row) = rest.split_at_mut(cols);
            for j in 0..cols {
                let (r, phi) = (grid.r[j], grid.phi[i]);
                let h = radial_hamiltonian(r, phi, delta, omega, RESONANCE_ORDER, 0.0);
                let action = r * REFERENCE_ACTION;
                let (phi, h) = rotate_phase(action, phi, h, tune, detuning, mux_total);
                let (w, wdot) = action_angle_to_normalized(action, phi, tune);
                h_row[j] = h;
                w_row[j] = w;
                wdot_row[j] = wdot;
            }
            Ok(())
        })?;
        let h = planes.slice(s![.., ..cols]).to_owned();
        let w = planes.slice(s![.., cols..2 * cols]).to_owned();
        let wdot = planes.slice(s![.., 2 * cols..]).to_owned();

        let projection = normalized_to_physical_grid(&w, &wdot, tune, observer.alfx, observer.betx);
        let degenerate_beta = match &projection {
            Projection::DegenerateOptics { beta, .. } => Some(*beta),
            Projection::Valid { .. } => None,
        };
        let (x, xp) = projection.into_parts();

        Ok(ContourOutcome::Field(HamiltonianField {
            x,
            xp,
            h,
            degenerate_beta,
        }))
    }
}

/// Evaluate a contour field on the default CPU backend.
pub fn build_contour(
    lattice: &LatticeTable,
    tune: f64,
    resonant_tune: f64,
    element: &str,
    r_min_exp: f64,
    r_max_exp: f64,
    point_count: usize,
) -> Result<ContourOutcome, CoreError> {
    let params = ContourParams {
        tune,
        resonant_tune,
        element: element.to_string(),
        r_min_exp,
        r_max_exp,
        point_count,
    };
    ResonanceHamiltonian::default().build_contour(lattice, &params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::normalized_to_physical;
    use crate::types::LatticeRow;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn ring() -> LatticeTable {
        LatticeTable::new(vec![
            LatticeRow { k2l: 0.8, ..LatticeRow::drift("XR", 3.0, 12.0, 0.4, 0.12) },
            LatticeRow { k3l: 2.0, ..LatticeRow::drift("OCT", 5.0, 7.0, -0.2, 0.21) },
            LatticeRow::drift("ES", 10.0, 9.5, -1.1, 0.47),
        ])
        .unwrap()
    }

    #[test]
    fn test_radial_hamiltonian_terms() {
        let h = radial_hamiltonian(4.0, 0.0, 0.5, 0.25, 3, 0.0);
        assert_relative_eq!(h, 0.5 * 4.0 + 0.25 * 16.0 + 8.0, max_relative = 1e-14);
        let h = radial_hamiltonian(4.0, std::f64::consts::PI / 3.0, 0.0, 0.0, 3, 0.0);
        assert_relative_eq!(h, -8.0, max_relative = 1e-12);
    }

    #[test]
    fn test_delta_omega_scaling() {
        let (delta, omega) = delta_omega(0.01, 3.0, 2.0, 1e-4, 3);
        assert_relative_eq!(delta, 0.01 / (2.0 * 1e-2), max_relative = 1e-12);
        assert_relative_eq!(omega, 3.0 / (2.0 * 1e2), max_relative = 1e-12);
    }

    #[test]
    fn test_cartesian_hamiltonian_matches_action_form() {
        // Without driving terms H = Δν·ν/2 · 2J/ν = Δν·J
        let (tune, detuning, j) = (1.67, 0.004, 2e-5);
        let (w, wdot) = action_angle_to_normalized(j, 0.7, tune);
        let h = hamiltonian_cartesian(w, wdot, tune, detuning, 0.0, 0.0);
        assert_relative_eq!(h, detuning * j, max_relative = 1e-12);
    }

    #[test]
    fn test_missing_element_gives_zero_field() {
        let outcome = build_contour(&ring(), 1.67, 5.0 / 3.0, "NOPE", -3.0, 0.5, 50).unwrap();
        assert!(outcome.is_element_missing());
        let field = outcome.field();
        assert_eq!(field.dim(), (2, 2));
        assert!(field.x.iter().chain(field.xp.iter()).chain(field.h.iter()).all(|&v| v == 0.0));
        assert_eq!(outcome.diagnostics().missing_element.as_deref(), Some("NOPE"));
    }

    #[test]
    fn test_grid_cell_matches_scalar_pipeline() {
        let lattice = ring();
        let params = ContourParams {
            r_min_exp: -3.0,
            point_count: 9,
            ..Default::default()
        };
        let field = ResonanceHamiltonian::default()
            .build_contour(&lattice, &params)
            .unwrap()
            .into_field();
        assert_eq!(field.dim(), (9, 9));

        let vs = virtual_sextupole(&lattice, params.tune);
        let p40 = virtual_octupole(&lattice, params.tune);
        let detuning = params.tune - params.resonant_tune;
        let (delta, omega) = delta_omega(detuning, 1.2 * p40, vs.magnitude, 2e-4, 3);
        let es = lattice.get("ES").unwrap();
        let mux_total = -(2.0 * std::f64::consts::PI * es.mux - vs.phase);

        let grid = PolarGrid::new(-3.0, 0.5, 9);
        let (i, j) = (2, 6);
        let h = radial_hamiltonian(grid.r[j], grid.phi[i], delta, omega, 3, 0.0);
        let action = grid.r[j] * 2e-4;
        let (phi, h) = rotate_phase(action, grid.phi[i], h, params.tune, detuning, mux_total);
        let (w, wdot) = action_angle_to_normalized(action, phi, params.tune);
        let (x, xp) = normalized_to_physical(w, wdot, params.tune, es.alfx, es.betx).unwrap();

        assert_relative_eq!(field.h[[i, j]], h, max_relative = 1e-12);
        assert_relative_eq!(field.x[[i, j]], x, max_relative = 1e-12);
        assert_relative_eq!(field.xp[[i, j]], xp, max_relative = 1e-12);
    }

    /// Forwards to the CPU backend and counts how often each entry point runs.
    struct CountingBackend {
        inner: CpuBackend,
        matrix_fills: std::sync::atomic::AtomicUsize,
        row_fills: std::sync::atomic::AtomicUsize,
    }

    impl ComputeBackend for CountingBackend {
        fn device_info(&self) -> sloex_compute::DeviceInfo {
            self.inner.device_info()
        }

        fn parallel_matrix_fill(
            &self,
            rows: usize,
            cols: usize,
            fill_fn: &(dyn Fn(usize, usize) -> f64 + Send + Sync),
        ) -> Result<Array2<f64>, sloex_compute::ComputeError> {
            self.matrix_fills.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.inner.parallel_matrix_fill(rows, cols, fill_fn)
        }

        fn parallel_row_fill(
            &self,
            rows: usize,
            cols: usize,
            fill_fn: &(dyn Fn(usize, &mut [f64]) -> Result<(), sloex_compute::ComputeError> + Send + Sync),
        ) -> Result<Array2<f64>, sloex_compute::ComputeError> {
            self.row_fills.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.inner.parallel_row_fill(rows, cols, fill_fn)
        }
    }

    #[test]
    fn test_mesh_is_evaluated_in_one_pass() {
        let backend = Arc::new(CountingBackend {
            inner: CpuBackend::new(),
            matrix_fills: Default::default(),
            row_fills: Default::default(),
        });
        let solver = ResonanceHamiltonian::new(backend.clone());
        let params = ContourParams {
            point_count: 12,
            ..Default::default()
        };
        let field = solver.build_contour(&ring(), &params).unwrap().into_field();
        assert_eq!(field.dim(), (12, 12));
        assert_eq!(field.x.dim(), (12, 12));
        assert_eq!(backend.row_fills.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(backend.matrix_fills.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn test_field_is_periodic_in_angle() {
        let outcome = build_contour(&ring(), 1.67, 5.0 / 3.0, "ES", -4.0, 0.5, 41).unwrap();
        let field = outcome.field();
        let last = field.dim().0 - 1;
        for j in 0..field.dim().1 {
            assert_abs_diff_eq!(field.h[[0, j]], field.h[[last, j]], epsilon = 1e-9 * field.h[[0, j]].abs().max(1.0));
            assert_abs_diff_eq!(field.x[[0, j]], field.x[[last, j]], epsilon = 1e-12);
            assert_abs_diff_eq!(field.xp[[0, j]], field.xp[[last, j]], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_beta_element_flags_degenerate_optics() {
        let lattice = LatticeTable::new(vec![
            LatticeRow { k2l: 0.8, ..LatticeRow::drift("XR", 3.0, 12.0, 0.4, 0.12) },
            LatticeRow::drift("BAD", 4.0, 0.0, 0.0, 0.3),
        ])
        .unwrap();
        let outcome = build_contour(&lattice, 1.67, 5.0 / 3.0, "BAD", -3.0, 0.0, 5).unwrap();
        let diagnostics = outcome.diagnostics();
        assert_eq!(diagnostics.degenerate_beta, Some(0.0));
        assert_eq!(diagnostics.non_finite_cells, 25);
        assert!(outcome.field().xp.iter().all(|v| v.is_nan()));
    }
}
