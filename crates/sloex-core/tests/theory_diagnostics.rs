//! Integration tests for the lattice and beam-parameter pipelines.
//!
//! Covers:
//! - Virtual multipoles of a small ring with chromatic and resonant sextupoles
//! - Hamiltonian contour fields: shape, periodicity, missing elements
//! - Steinbach diagram reproducibility and the closed-form relations

use std::f64::consts::PI;
use std::sync::Arc;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use rand::rngs::StdRng;
use rand::SeedableRng;

use sloex_compute::CpuBackend;
use sloex_core::hamiltonian::{build_contour, ContourParams, ResonanceHamiltonian};
use sloex_core::multipole::{strongest_sextupoles, virtual_octupole, virtual_sextupole};
use sloex_core::steinbach::{
    hardt_chromaticity, particle_ensemble, particle_ensemble_seeded, spiral_step, stopband_curve,
    steinbach_diagram_seeded, HardtParams, SteinbachParams,
};
use sloex_core::types::{LatticeRow, LatticeTable};

// ─────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────

/// A 12-cell toy ring: one focusing sextupole per cell (chromatic), one
/// resonant sextupole, an octupole and the electrostatic septum.
fn toy_ring() -> LatticeTable {
    let mut rows = Vec::new();
    for cell in 0..12 {
        let mux = cell as f64 * 1.67 / 12.0;
        rows.push(LatticeRow {
            k2l: 0.15,
            ..LatticeRow::drift(format!("SF{cell}"), cell as f64 * 6.0, 10.5, -0.3, mux)
        });
        rows.push(LatticeRow::drift(format!("QD{cell}"), cell as f64 * 6.0 + 3.0, 3.2, 0.4, mux + 0.05));
    }
    rows.push(LatticeRow {
        k2l: 1.1,
        ..LatticeRow::drift("XR", 40.0, 11.0, 0.2, 0.92)
    });
    rows.push(LatticeRow {
        k3l: 4.0,
        ..LatticeRow::drift("OCT", 44.0, 8.0, -0.5, 1.01)
    });
    rows.push(LatticeRow::drift("ES", 60.0, 9.2, -1.4, 1.35));
    LatticeTable::new(rows).unwrap()
}

fn lattice_without_multipoles() -> LatticeTable {
    LatticeTable::new(
        (0..8)
            .map(|i| LatticeRow::drift(format!("D{i}"), i as f64, 5.0 + i as f64, 0.1, i as f64 * 0.2))
            .collect(),
    )
    .unwrap()
}

// ─────────────────────────────────────────────────────────────
// Virtual multipoles
// ─────────────────────────────────────────────────────────────

#[test]
fn test_empty_multipole_sets_are_zero() {
    let lattice = lattice_without_multipoles();
    let vs = virtual_sextupole(&lattice, 1.67);
    assert_eq!((vs.magnitude, vs.phase), (0.0, 0.0));
    assert_eq!(virtual_octupole(&lattice, 1.67), 0.0);
}

#[test]
fn test_virtual_sextupole_is_dominated_by_resonant_element() {
    let lattice = toy_ring();
    let vs = virtual_sextupole(&lattice, 1.67);
    assert!(vs.magnitude > 0.0);
    assert!(vs.phase.abs() <= PI / 3.0 + 1e-12);
    assert_eq!(strongest_sextupoles(&lattice, 1)[0].name, "XR");
}

#[test]
fn test_octupole_strength_scales_inversely_with_tune() {
    let lattice = toy_ring();
    let ratio = virtual_octupole(&lattice, 1.0) / virtual_octupole(&lattice, 2.0);
    assert_relative_eq!(ratio, 2.0, max_relative = 1e-12);
}

// ─────────────────────────────────────────────────────────────
// Hamiltonian contours
// ─────────────────────────────────────────────────────────────

#[test]
fn test_contour_grid_shape_and_finiteness() {
    let outcome = build_contour(&toy_ring(), 1.67, 5.0 / 3.0, "ES", -6.0, 0.5, 60).unwrap();
    assert!(!outcome.is_element_missing());
    let field = outcome.field();
    assert_eq!(field.dim(), (60, 60));
    assert_eq!(field.x.dim(), field.xp.dim());
    let diagnostics = outcome.diagnostics();
    assert_eq!(diagnostics.non_finite_cells, 0);
    assert_eq!(diagnostics.total_cells, 3600);
}

#[test]
fn test_contour_is_periodic_in_angle() {
    let outcome = build_contour(&toy_ring(), 1.67, 5.0 / 3.0, "ES", -5.0, 0.5, 73).unwrap();
    let field = outcome.field();
    let last = field.dim().0 - 1;
    for j in 0..field.dim().1 {
        let scale = field.h[[0, j]].abs().max(1.0);
        assert_abs_diff_eq!(field.h[[0, j]], field.h[[last, j]], epsilon = 1e-9 * scale);
        assert_abs_diff_eq!(field.x[[0, j]], field.x[[last, j]], epsilon = 1e-12);
        assert_abs_diff_eq!(field.xp[[0, j]], field.xp[[last, j]], epsilon = 1e-12);
    }
}

#[test]
fn test_missing_element_returns_zero_triple() {
    let outcome = build_contour(&toy_ring(), 1.67, 5.0 / 3.0, "NOT_THERE", -10.0, 0.5, 500).unwrap();
    assert!(outcome.is_element_missing());
    let field = outcome.into_field();
    assert_eq!(field.dim(), (2, 2));
    for grid in [&field.x, &field.xp, &field.h] {
        assert!(grid.iter().all(|&v| v == 0.0));
    }
}

#[test]
fn test_dedicated_thread_pool_matches_default_backend() {
    let params = ContourParams {
        r_min_exp: -4.0,
        point_count: 31,
        ..Default::default()
    };
    let lattice = toy_ring();
    let pooled = ResonanceHamiltonian::new(Arc::new(CpuBackend::with_threads(2).unwrap()))
        .build_contour(&lattice, &params)
        .unwrap()
        .into_field();
    let default = ResonanceHamiltonian::default()
        .build_contour(&lattice, &params)
        .unwrap()
        .into_field();
    assert_eq!(pooled.h, default.h);
    assert_eq!(pooled.x, default.x);
}

// ─────────────────────────────────────────────────────────────
// Steinbach diagram
// ─────────────────────────────────────────────────────────────

#[test]
fn test_ensemble_reproducible_across_calls() {
    let a = particle_ensemble_seeded(100, 1e-4, 1e-6).unwrap();
    let b = particle_ensemble_seeded(100, 1e-4, 1e-6).unwrap();
    for (x, y) in a.momentum_offsets.iter().zip(&b.momentum_offsets) {
        assert_eq!(x.to_bits(), y.to_bits());
    }
    for (x, y) in a.amplitudes.iter().zip(&b.amplitudes) {
        assert_eq!(x.to_bits(), y.to_bits());
    }
}

#[test]
fn test_ensemble_seed_is_overridable() {
    let fixed = particle_ensemble_seeded(50, 1e-4, 1e-6).unwrap();
    let other = particle_ensemble(50, 1e-4, 1e-6, &mut StdRng::seed_from_u64(2024)).unwrap();
    assert_ne!(fixed, other);
}

#[test]
fn test_stopband_scenario() {
    let curve = stopband_curve(36.7168);
    assert_eq!(curve.tune.len(), 5000);
    assert_eq!(curve.amplitude.len(), 5000);
    assert_abs_diff_eq!(curve.amplitude[2500], 0.0, epsilon = 1e-4);
    for i in 0..5000 {
        assert_eq!(curve.amplitude[i], curve.amplitude[4999 - i]);
        assert_eq!(curve.tune[i], -curve.tune[4999 - i]);
    }
}

#[test]
fn test_closed_forms() {
    let step = spiral_step(36.7168, 0.055, 45.0);
    let angle = 45f64.to_radians();
    assert_relative_eq!(step.step, 0.75 * 36.7168 / angle.cos() * 0.055 * 0.055, max_relative = 1e-14);
    assert_relative_eq!(
        step.kick,
        0.75 * 36.7168 * angle.tan() / angle.cos() * 0.055 * 0.055,
        max_relative = 1e-14
    );

    let chroma = hardt_chromaticity(36.7168, 3.54, -0.6, 90.0, 36.7, 186.1, 1.67);
    assert_relative_eq!(chroma, -4.205_298_127_384_297, max_relative = 1e-9);
}

#[test]
fn test_hardt_chromaticity_feeds_diagram() {
    let hardt = HardtParams {
        enabled: true,
        ..Default::default()
    };
    let mut params = SteinbachParams::default();
    params.chromaticity = hardt.chromaticity(&params);
    let diagram = steinbach_diagram_seeded(&params).unwrap();
    let ensemble = particle_ensemble_seeded(params.particle_count, params.momentum_spread, params.emittance).unwrap();
    for (q, dp) in diagram.particle_tunes.iter().zip(&ensemble.momentum_offsets) {
        assert_relative_eq!(*q, params.tune + dp * params.chromaticity, max_relative = 1e-14);
    }
}

#[test]
fn test_diagram_serialises_to_json() {
    let diagram = steinbach_diagram_seeded(&SteinbachParams {
        particle_count: 5,
        ..Default::default()
    })
    .unwrap();
    let json = serde_json::to_string(&diagram).unwrap();
    assert!(json.contains("\"particle_tunes\""));
    assert!(json.contains("\"amplitude_axis\""));
}
