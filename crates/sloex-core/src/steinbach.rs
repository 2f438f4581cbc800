//! Steinbach diagram and the closed-form slow-extraction relations.
//!
//! The Steinbach diagram places each beam particle by tune and betatron
//! amplitude against the stopband of the third-order resonance. A particle
//! whose amplitude lies above the stopband line for its tune offset is
//! unstable and is extracted.
//!
//! The synthetic ensemble is drawn from a seeded generator. With the
//! default seed, identical `(Np, dp/p, εx)` always give a bit-identical
//! ensemble, so an unchanged beam does not jitter between renders.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::grid::linspace;

/// Number of samples along the stopband tune axis.
pub const STOPBAND_SAMPLES: usize = 5000;

/// Seed of the default ensemble generator.
pub const ENSEMBLE_SEED: u64 = 1;

/// Stopband boundary: amplitude versus tune distance from resonance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopbandCurve {
    /// Tune distance from the resonance, `linspace(-0.5, 0.5)`.
    pub tune: Vec<f64>,
    /// Stopband amplitude (√m) at each tune distance.
    pub amplitude: Vec<f64>,
}

impl StopbandCurve {
    /// The tune axis shifted onto an absolute resonant tune.
    pub fn centred_on(&self, resonant_tune: f64) -> Vec<f64> {
        self.tune.iter().map(|dq| resonant_tune + dq).collect()
    }
}

/// Stopband boundary for a virtual sextupole of normalised strength `S`:
/// `A = sqrt(48π√3) · |ΔQ / S|`.
pub fn stopband_curve(sextupole_strength: f64) -> StopbandCurve {
    let slope = (48.0 * PI * 3f64.sqrt()).sqrt();
    let tune = linspace(-0.5, 0.5, STOPBAND_SAMPLES);
    let amplitude = tune
        .iter()
        .map(|dq| slope * (dq / sextupole_strength).abs())
        .collect();
    StopbandCurve { tune, amplitude }
}

/// Synthetic beam particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleEnsemble {
    /// Momentum offsets dp/p, uniform in `[-dpp, dpp)`.
    pub momentum_offsets: Vec<f64>,
    /// Betatron amplitudes (√m), `sqrt(|ε| / π)` with `ε ~ N(0, εx)`.
    pub amplitudes: Vec<f64>,
}

impl ParticleEnsemble {
    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }
}

/// Generator seeded with [`ENSEMBLE_SEED`].
pub fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(ENSEMBLE_SEED)
}

/// Draw `np` particles from `rng`.
///
/// All momentum offsets are drawn before any emittance sample, so the
/// stream layout only depends on `np`.
pub fn particle_ensemble<R: Rng + ?Sized>(
    np: usize,
    dpp: f64,
    emittance: f64,
    rng: &mut R,
) -> Result<ParticleEnsemble, CoreError> {
    if !dpp.is_finite() {
        return Err(CoreError::InvalidParameter(format!(
            "momentum spread must be finite, got {dpp}"
        )));
    }
    if !emittance.is_finite() || emittance < 0.0 {
        return Err(CoreError::InvalidParameter(format!(
            "emittance must be finite and non-negative, got {emittance}"
        )));
    }

    let momentum_offsets = (0..np)
        .map(|_| -dpp + 2.0 * dpp * rng.gen::<f64>())
        .collect();
    let amplitudes = (0..np)
        .map(|_| {
            let z: f64 = rng.sample(StandardNormal);
            ((emittance * z).abs() / PI).sqrt()
        })
        .collect();

    Ok(ParticleEnsemble {
        momentum_offsets,
        amplitudes,
    })
}

/// [`particle_ensemble`] drawn from the fixed default seed.
pub fn particle_ensemble_seeded(
    np: usize,
    dpp: f64,
    emittance: f64,
) -> Result<ParticleEnsemble, CoreError> {
    particle_ensemble(np, dpp, emittance, &mut seeded_rng())
}

/// Chromatic tune of each particle: `Q + δ · Q'`.
pub fn particle_tunes(working_tune: f64, momentum_offsets: &[f64], chromaticity: f64) -> Vec<f64> {
    momentum_offsets
        .iter()
        .map(|dp| working_tune + dp * chromaticity)
        .collect()
}

/// Separatrix spiral step and kick at the electrostatic septum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpiralStep {
    /// Spiral step ΔR (m).
    pub step: f64,
    /// Spiral kick ΔR' (rad).
    pub kick: f64,
}

/// Spiral step for a virtual sextupole `S`, septum position `X_ES` (m) and
/// separatrix angle (degrees):
/// `ΔR = ¾ S X_ES² / cos φ`, `ΔR' = ¾ S X_ES² tan φ / cos φ`.
pub fn spiral_step(sextupole_strength: f64, septum_position: f64, separatrix_angle_deg: f64) -> SpiralStep {
    let angle = separatrix_angle_deg.to_radians();
    let scale = 0.75 * sextupole_strength * septum_position.powi(2);
    SpiralStep {
        step: scale / angle.cos(),
        kick: scale * angle.tan() / angle.cos(),
    }
}

/// Chromaticity satisfying the Hardt condition, which aligns the
/// separatrices of all momenta at the septum.
///
/// Angles and phase advances are in degrees. With
/// `Δμ = 360 − (μ_ES − μ_XR)/Q · 360`:
///
/// `Q' = −S/(4π) · (D cos(α − Δμ) + D' sin(α − Δμ))`.
pub fn hardt_chromaticity(
    sextupole_strength: f64,
    dispersion: f64,
    dispersion_prime: f64,
    alpha_deg: f64,
    mu_es_deg: f64,
    mu_xr_deg: f64,
    working_tune: f64,
) -> f64 {
    let dmu = 360.0 - (mu_es_deg - mu_xr_deg) / working_tune * 360.0;
    let angle = alpha_deg.to_radians() - dmu.to_radians();
    -sextupole_strength / (4.0 * PI) * (dispersion * angle.cos() + dispersion_prime * angle.sin())
}

/// Beam and resonance parameters of a Steinbach diagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteinbachParams {
    /// Virtual sextupole strength S (m⁻¹).
    pub sextupole_strength: f64,
    /// Working horizontal tune.
    pub tune: f64,
    /// Resonant horizontal tune.
    pub resonant_tune: f64,
    /// Momentum spread dp/p (half width).
    pub momentum_spread: f64,
    /// Horizontal chromaticity Q'.
    pub chromaticity: f64,
    /// RMS emittance (m).
    pub emittance: f64,
    /// Number of particles.
    pub particle_count: usize,
}

impl Default for SteinbachParams {
    fn default() -> Self {
        Self {
            sextupole_strength: 36.7168,
            tune: 1.67,
            resonant_tune: 5.0 / 3.0,
            momentum_spread: 1e-4,
            chromaticity: -4.0,
            emittance: 1e-6,
            particle_count: 100,
        }
    }
}

/// Septum geometry for the spiral-step calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiralStepParams {
    /// Electrostatic septum position (m).
    pub septum_position: f64,
    /// Separatrix orientation (degrees).
    pub separatrix_angle: f64,
}

impl Default for SpiralStepParams {
    fn default() -> Self {
        Self {
            septum_position: 0.055,
            separatrix_angle: 45.0,
        }
    }
}

impl SpiralStepParams {
    pub fn evaluate(&self, sextupole_strength: f64) -> SpiralStep {
        spiral_step(sextupole_strength, self.septum_position, self.separatrix_angle)
    }
}

/// Optics at the septum for the Hardt condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardtParams {
    /// Replace the configured chromaticity with the Hardt value.
    pub enabled: bool,
    /// Dispersion at the septum (m).
    pub dispersion: f64,
    /// Dispersion derivative at the septum.
    pub dispersion_prime: f64,
    /// Separatrix orientation (degrees).
    pub alpha: f64,
    /// Phase advance at the septum (degrees).
    pub mu_es: f64,
    /// Phase advance at the virtual resonant sextupole (degrees).
    pub mu_xr: f64,
}

impl Default for HardtParams {
    fn default() -> Self {
        Self {
            enabled: false,
            dispersion: 3.54,
            dispersion_prime: -0.6,
            alpha: 90.0,
            mu_es: 36.7,
            mu_xr: 186.1,
        }
    }
}

impl HardtParams {
    /// Hardt chromaticity for the sextupole strength and tune of `beam`.
    pub fn chromaticity(&self, beam: &SteinbachParams) -> f64 {
        hardt_chromaticity(
            beam.sextupole_strength,
            self.dispersion,
            self.dispersion_prime,
            self.alpha,
            self.mu_es,
            self.mu_xr,
            beam.tune,
        )
    }
}

/// Everything needed to draw a Steinbach diagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteinbachDiagram {
    /// Chromatic tune of each particle.
    pub particle_tunes: Vec<f64>,
    /// Amplitude of each particle (√m).
    pub amplitudes: Vec<f64>,
    /// Absolute tune axis of the stopband line.
    pub tune_axis: Vec<f64>,
    /// Stopband amplitude at each point of `tune_axis`.
    pub amplitude_axis: Vec<f64>,
}

/// Assemble a Steinbach diagram, drawing the ensemble from `rng`.
pub fn steinbach_diagram<R: Rng + ?Sized>(
    params: &SteinbachParams,
    rng: &mut R,
) -> Result<SteinbachDiagram, CoreError> {
    let ensemble = particle_ensemble(
        params.particle_count,
        params.momentum_spread,
        params.emittance,
        rng,
    )?;
    let curve = stopband_curve(params.sextupole_strength);
    log::debug!(
        "Steinbach diagram: {} particles, S={}, Q={}, Q'={}",
        ensemble.len(),
        params.sextupole_strength,
        params.tune,
        params.chromaticity
    );

    Ok(SteinbachDiagram {
        particle_tunes: particle_tunes(params.tune, &ensemble.momentum_offsets, params.chromaticity),
        amplitudes: ensemble.amplitudes,
        tune_axis: curve.centred_on(params.resonant_tune),
        amplitude_axis: curve.amplitude,
    })
}

/// [`steinbach_diagram`] with the fixed default seed.
pub fn steinbach_diagram_seeded(params: &SteinbachParams) -> Result<SteinbachDiagram, CoreError> {
    steinbach_diagram(params, &mut seeded_rng())
}
