//! TOML configuration deserialisation for diagnostics jobs.
//!
//! ```toml
//! [steinbach]
//! sextupole_strength = 36.7168
//! tune = 1.67
//!
//! [hardt]
//! enabled = true
//!
//! [hamiltonian]
//! twiss_file = "pimms.tfs"
//! element = "ES"
//!
//! [tune]
//! track_file = "trackone"
//! window_turns = 128
//! step_turns = 10
//! axis = "x"
//! ```
//!
//! Relative file paths are resolved against the directory of the job file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use sloex_core::hamiltonian::ContourParams;
use sloex_core::steinbach::{HardtParams, SpiralStepParams, SteinbachParams};
use sloex_core::tune::TuneWindow;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub steinbach: SteinbachParams,
    #[serde(default)]
    pub spiral_step: SpiralStepParams,
    #[serde(default)]
    pub hardt: HardtParams,
    /// Resonance Hamiltonian contour (skipped when absent).
    pub hamiltonian: Option<HamiltonianConfig>,
    /// Tune extraction from tracking data (skipped when absent).
    pub tune: Option<TuneConfig>,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Hamiltonian contour inputs. Tunes default to those of `[steinbach]`.
#[derive(Debug, Deserialize)]
pub struct HamiltonianConfig {
    /// MAD-X Twiss table with BETX, ALFX, MUX, K2L and K3L columns.
    pub twiss_file: PathBuf,
    #[serde(default = "default_element")]
    pub element: String,
    pub tune: Option<f64>,
    pub resonant_tune: Option<f64>,
    #[serde(default = "default_r_min_exp")]
    pub r_min_exp: f64,
    #[serde(default = "default_r_max_exp")]
    pub r_max_exp: f64,
    #[serde(default = "default_point_count")]
    pub point_count: usize,
}

impl HamiltonianConfig {
    /// Contour parameters, taking unset tunes from the beam section.
    pub fn contour_params(&self, beam: &SteinbachParams) -> ContourParams {
        ContourParams {
            tune: self.tune.unwrap_or(beam.tune),
            resonant_tune: self.resonant_tune.unwrap_or(beam.resonant_tune),
            element: self.element.clone(),
            r_min_exp: self.r_min_exp,
            r_max_exp: self.r_max_exp,
            point_count: self.point_count,
        }
    }
}

fn default_element() -> String {
    ContourParams::default().element
}
fn default_r_min_exp() -> f64 {
    ContourParams::default().r_min_exp
}
fn default_r_max_exp() -> f64 {
    ContourParams::default().r_max_exp
}
fn default_point_count() -> usize {
    ContourParams::default().point_count
}

/// Tune extraction inputs.
#[derive(Debug, Deserialize)]
pub struct TuneConfig {
    /// PTC one-table tracking output.
    pub track_file: PathBuf,
    /// Observation point; default is the first one after `start`.
    pub observation: Option<String>,
    /// Analyse only the first N particles (default: all).
    pub particles: Option<usize>,
    #[serde(flatten)]
    pub window: TuneWindow,
}

/// Compute backend settings.
#[derive(Debug, Default, Deserialize)]
pub struct ComputeConfig {
    /// Worker threads; 0 uses the global rayon pool.
    #[serde(default)]
    pub threads: usize,
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to write the CSV tables (default: true).
    #[serde(default = "default_true")]
    pub save_csv: bool,
    /// Whether to also write the Steinbach diagram as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_csv: true,
            save_json: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let mut config: JobConfig = toml::from_str(&content)?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    if let Some(ham) = &mut config.hamiltonian {
        ham.twiss_file = base.join(&ham.twiss_file);
    }
    if let Some(tune) = &mut config.tune {
        tune.track_file = base.join(&tune.track_file);
    }
    Ok(config)
}
