//! Virtual multipoles: the distributed sextupoles and octupoles of a
//! lattice folded into a single equivalent element.
//!
//! Strengths follow the Wiedemann normalisation. For sextupole `i` with
//! integrated strength $k_{2}L_i$ at phase advance $\mu_i$ (turns):
//!
//! $$ \tilde p_{3,i} = \frac{\sqrt 2}{24\pi\sqrt\nu}\, k_2L_i\, \beta_{x,i}^{3/2} $$
//!
//! and the virtual sextupole is the resultant of the phasors
//! $\tilde p_{3,i}\, e^{3 i \cdot 2\pi\mu_i}$. Octupoles only contribute to
//! amplitude detuning, so their strengths add directly:
//!
//! $$ \tilde p_{40} = \sum_i \frac{k_3L_i\, \beta_{x,i}^2}{32\pi\nu}. $$
//!
//! A lattice without the relevant elements yields zero strength.

use std::f64::consts::{PI, SQRT_2};

use serde::{Deserialize, Serialize};

use crate::types::{LatticeRow, LatticeTable};

/// Equivalent single sextupole for a lattice at a given tune.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VirtualSextupole {
    /// Normalised strength $\tilde p_3$.
    pub magnitude: f64,
    /// Phase location (radians), `atan2(Σsin, Σcos) / 3`.
    pub phase: f64,
}

/// Compute the virtual sextupole of a lattice.
///
/// Contributions are accumulated in table order.
pub fn virtual_sextupole(lattice: &LatticeTable, tune: f64) -> VirtualSextupole {
    let factor = SQRT_2 / (24.0 * PI * tune.sqrt());

    let mut sin_sum = 0.0_f64;
    let mut cos_sum = 0.0_f64;
    let mut count = 0usize;
    for row in lattice.sextupoles() {
        let strength = factor * row.k2l * row.betx.powf(1.5);
        let phase = 2.0 * PI * row.mux;
        sin_sum += strength * (3.0 * phase).sin();
        cos_sum += strength * (3.0 * phase).cos();
        count += 1;
    }

    if count == 0 {
        log::debug!("No sextupoles in lattice; virtual sextupole is zero");
        return VirtualSextupole::default();
    }

    VirtualSextupole {
        magnitude: sin_sum.hypot(cos_sum),
        phase: sin_sum.atan2(cos_sum) / 3.0,
    }
}

/// Compute the virtual octupole strength $\tilde p_{40}$ of a lattice.
pub fn virtual_octupole(lattice: &LatticeTable, tune: f64) -> f64 {
    let factor = 1.0 / (32.0 * tune * PI);
    lattice
        .octupoles()
        .map(|row| factor * row.k3l * row.betx.powi(2))
        .sum()
}

/// The `k` sextupoles with the largest |k2l|, strongest first.
pub fn strongest_sextupoles(lattice: &LatticeTable, k: usize) -> Vec<&LatticeRow> {
    strongest(lattice.sextupoles(), k, |r| r.k2l)
}

/// The `k` octupoles with the largest |k3l|, strongest first.
pub fn strongest_octupoles(lattice: &LatticeTable, k: usize) -> Vec<&LatticeRow> {
    strongest(lattice.octupoles(), k, |r| r.k3l)
}

fn strongest<'a>(
    rows: impl Iterator<Item = &'a LatticeRow>,
    k: usize,
    strength: impl Fn(&LatticeRow) -> f64,
) -> Vec<&'a LatticeRow> {
    let mut rows: Vec<&LatticeRow> = rows.collect();
    // Stable sort keeps table order among equal strengths
    rows.sort_by(|a, b| strength(b).abs().total_cmp(&strength(a).abs()));
    rows.truncate(k);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sextupole(name: &str, mux: f64, betx: f64, k2l: f64) -> LatticeRow {
        LatticeRow {
            k2l,
            ..LatticeRow::drift(name, 0.0, betx, 0.0, mux)
        }
    }

    fn octupole(name: &str, betx: f64, k3l: f64) -> LatticeRow {
        LatticeRow {
            k3l,
            ..LatticeRow::drift(name, 0.0, betx, 0.0, 0.0)
        }
    }

    #[test]
    fn test_no_sextupoles_gives_zero() {
        let table = LatticeTable::new(vec![
            LatticeRow::drift("D1", 0.0, 10.0, 0.0, 0.0),
            octupole("O1", 5.0, 2.0),
        ])
        .unwrap();
        assert_eq!(virtual_sextupole(&table, 1.67), VirtualSextupole { magnitude: 0.0, phase: 0.0 });
    }

    #[test]
    fn test_no_octupoles_gives_zero() {
        let table = LatticeTable::new(vec![sextupole("S1", 0.1, 10.0, 0.5)]).unwrap();
        assert_eq!(virtual_octupole(&table, 1.67), 0.0);
    }

    #[test]
    fn test_single_sextupole_closed_form() {
        let (tune, betx, k2l, mux) = (1.67, 9.0, 0.4, 0.05);
        let table = LatticeTable::new(vec![sextupole("S1", mux, betx, k2l)]).unwrap();
        let vs = virtual_sextupole(&table, tune);

        let expected = SQRT_2 / (24.0 * PI * tune.sqrt()) * k2l * 27.0;
        assert_relative_eq!(vs.magnitude, expected, max_relative = 1e-12);
        assert_relative_eq!(vs.phase, 2.0 * PI * mux, max_relative = 1e-12);
    }

    #[test]
    fn test_sextupoles_a_third_turn_apart_cancel() {
        // Phases 0, 1/9, 2/9 turns → 3φ spaced by 2π/3
        let table = LatticeTable::new(vec![
            sextupole("S1", 0.0, 4.0, 1.0),
            sextupole("S2", 1.0 / 9.0, 4.0, 1.0),
            sextupole("S3", 2.0 / 9.0, 4.0, 1.0),
        ])
        .unwrap();
        assert!(virtual_sextupole(&table, 1.67).magnitude < 1e-14);
    }

    #[test]
    fn test_octupoles_add_linearly() {
        let tune = 1.67;
        let table = LatticeTable::new(vec![octupole("O1", 2.0, 1.5), octupole("O2", 3.0, -0.5)]).unwrap();
        let expected = (1.5 * 4.0 - 0.5 * 9.0) / (32.0 * tune * PI);
        assert_relative_eq!(virtual_octupole(&table, tune), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_strongest_ranking() {
        let table = LatticeTable::new(vec![
            sextupole("S1", 0.0, 1.0, 0.1),
            sextupole("S2", 0.0, 1.0, -0.7),
            sextupole("S3", 0.0, 1.0, 0.3),
            sextupole("S4", 0.0, 1.0, 0.7),
        ])
        .unwrap();
        let names: Vec<&str> = strongest_sextupoles(&table, 3).iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["S2", "S4", "S3"]);
        assert!(strongest_octupoles(&table, 3).is_empty());
    }
}
