//! Core types shared across the sloexlab pipelines.
//!
//! This module defines the lattice optics table consumed by the multipole
//! and Hamiltonian code, and the phase-space coordinate selector used by the
//! tune extractor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One element of a lattice optics (Twiss) table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeRow {
    /// Element identifier, unique within a table.
    pub name: String,
    /// Longitudinal position (m).
    pub s: f64,
    /// Horizontal beta function (m).
    pub betx: f64,
    /// Horizontal alpha function.
    pub alfx: f64,
    /// Horizontal phase advance in turns (units of 2π).
    pub mux: f64,
    /// Integrated sextupole strength (m⁻²).
    #[serde(default)]
    pub k2l: f64,
    /// Integrated octupole strength (m⁻³).
    #[serde(default)]
    pub k3l: f64,
}

impl LatticeRow {
    /// Create a row with no multipole content.
    pub fn drift(name: impl Into<String>, s: f64, betx: f64, alfx: f64, mux: f64) -> Self {
        Self {
            name: name.into(),
            s,
            betx,
            alfx,
            mux,
            k2l: 0.0,
            k3l: 0.0,
        }
    }
}

/// Ordered, immutable collection of lattice rows keyed by element name.
#[derive(Debug, Clone, Default)]
pub struct LatticeTable {
    rows: Vec<LatticeRow>,
    index: HashMap<String, usize>,
}

impl LatticeTable {
    /// Build a table, rejecting duplicate element identifiers.
    pub fn new(rows: Vec<LatticeRow>) -> Result<Self, CoreError> {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if index.insert(row.name.clone(), i).is_some() {
                return Err(CoreError::DuplicateElement(row.name.clone()));
            }
        }
        Ok(Self { rows, index })
    }

    /// Rows in table order.
    pub fn rows(&self) -> &[LatticeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up an element by identifier.
    pub fn get(&self, name: &str) -> Option<&LatticeRow> {
        self.index.get(name).map(|&i| &self.rows[i])
    }

    /// Rows carrying a nonzero sextupole strength, in table order.
    pub fn sextupoles(&self) -> impl Iterator<Item = &LatticeRow> {
        self.rows.iter().filter(|r| r.k2l != 0.0)
    }

    /// Rows carrying a nonzero octupole strength, in table order.
    pub fn octupoles(&self) -> impl Iterator<Item = &LatticeRow> {
        self.rows.iter().filter(|r| r.k3l != 0.0)
    }
}

/// Phase-space coordinate of a tracked trajectory.
///
/// The discriminant is the index along the first axis of a
/// `[6, particles, turns]` trajectory array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateAxis {
    #[default]
    X = 0,
    Px = 1,
    Y = 2,
    Py = 3,
    T = 4,
    Pt = 5,
}

impl CoordinateAxis {
    /// Number of coordinates in a trajectory array.
    pub const COUNT: usize = 6;

    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::str::FromStr for CoordinateAxis {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x" => Ok(Self::X),
            "px" | "xp" => Ok(Self::Px),
            "y" => Ok(Self::Y),
            "py" | "yp" => Ok(Self::Py),
            "t" => Ok(Self::T),
            "pt" => Ok(Self::Pt),
            other => Err(CoreError::InvalidParameter(format!(
                "unknown coordinate '{other}', expected one of x, px, y, py, t, pt"
            ))),
        }
    }
}
