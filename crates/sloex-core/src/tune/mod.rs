//! Sliding-window betatron tune extraction from tracked trajectories.
//!
//! For every particle the chosen coordinate is cut into windows of
//! `window_turns` turns ending every `step_turns` turns. Each window has its
//! mean removed and is handed to [`naff::Naff`] for its dominant frequency.
//!
//! The result is a `[2, particles, samples]` array: plane 0 holds the tune
//! estimates, plane 1 the turn number each sample belongs to. Samples whose
//! turn does not exceed the window length have too little history and hold
//! a zero tune. Particles are independent; each one fills its own row of a
//! pre-sized buffer on the compute backend, and the cancellation token is
//! polled before a particle starts.

pub mod naff;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{s, Array3, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use sloex_compute::{CancelToken, ComputeBackend, CpuBackend};

use crate::error::CoreError;
use crate::types::CoordinateAxis;
use naff::Naff;

/// Window layout of a tune scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneWindow {
    /// Turns per frequency analysis.
    pub window_turns: usize,
    /// Turns between consecutive samples.
    pub step_turns: usize,
    /// Coordinate to analyse.
    pub axis: CoordinateAxis,
}

impl Default for TuneWindow {
    fn default() -> Self {
        Self {
            window_turns: 128,
            step_turns: 10,
            axis: CoordinateAxis::X,
        }
    }
}

impl TuneWindow {
    /// Number of samples taken over `turns` turns.
    pub fn sample_count(&self, turns: usize) -> usize {
        turns / self.step_turns
    }
}

/// Counts of samples that carry a sentinel instead of a tune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TuneDiagnostics {
    /// Samples whose turn did not exceed the window length.
    pub insufficient_history: usize,
    /// Windows with no oscillation to analyse.
    pub flat_windows: usize,
    /// Total samples, `particles × samples per particle`.
    pub total_samples: usize,
}

/// Tune evolution of every analysed particle.
#[derive(Debug, Clone)]
pub struct TuneSeries {
    /// Shape `[2, particles, samples]`: tune estimates, then turn numbers.
    pub data: Array3<f64>,
    pub diagnostics: TuneDiagnostics,
}

impl TuneSeries {
    /// Tune estimates, shape `[particles, samples]`.
    pub fn tunes(&self) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), 0)
    }

    /// Turn number of each sample, shape `[particles, samples]`.
    pub fn turns(&self) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), 1)
    }

    pub fn particle_count(&self) -> usize {
        self.data.dim().1
    }

    pub fn sample_count(&self) -> usize {
        self.data.dim().2
    }
}

/// Runs sliding-window tune scans on a compute backend.
pub struct TuneExtractor {
    pub backend: Arc<dyn ComputeBackend>,
    pub cancel: Option<CancelToken>,
}

impl Default for TuneExtractor {
    fn default() -> Self {
        Self {
            backend: Arc::new(CpuBackend::new()),
            cancel: None,
        }
    }
}

impl TuneExtractor {
    pub fn new(backend: Arc<dyn ComputeBackend>) -> Self {
        Self {
            backend,
            cancel: None,
        }
    }

    /// Attach a token that aborts the scan between particles.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Extract the tune series of the first `particle_count` particles of a
    /// `[6, particles, turns]` trajectory array.
    pub fn extract(
        &self,
        trajectories: ArrayView3<'_, f64>,
        particle_count: usize,
        window: &TuneWindow,
    ) -> Result<TuneSeries, CoreError> {
        if window.step_turns == 0 {
            return Err(CoreError::InvalidParameter("step_turns must be at least 1".into()));
        }
        if window.window_turns == 0 {
            return Err(CoreError::InvalidParameter("window_turns must be at least 1".into()));
        }

        let (coords, particles, turns) = trajectories.dim();
        let axis = window.axis.index();
        if axis >= coords {
            return Err(CoreError::ShapeMismatch {
                expected: format!("at least {} coordinates", axis + 1),
                found: format!("{coords}"),
            });
        }
        if particle_count > particles {
            return Err(CoreError::ShapeMismatch {
                expected: format!("at least {particle_count} particles"),
                found: format!("{particles}"),
            });
        }

        let samples = window.sample_count(turns);
        let naff = Naff::new(window.window_turns);
        let flat_windows = AtomicUsize::new(0);
        log::debug!(
            "Tune scan: {} particles x {} samples (window {}, step {}, axis {:?}) on {}",
            particle_count,
            samples,
            window.window_turns,
            window.step_turns,
            window.axis,
            self.backend.device_info().name
        );

        let tunes = self.backend.parallel_row_fill(particle_count, samples, &|p, out| {
            if let Some(token) = &self.cancel {
                token.check()?;
            }
            let series = trajectories.slice(s![axis, p, ..]);
            let mut buffer = vec![0.0; window.window_turns];

            for (t, tune) in out.iter_mut().enumerate() {
                let turn = t * window.step_turns;
                if turn <= window.window_turns {
                    continue;
                }
                for (slot, &v) in buffer
                    .iter_mut()
                    .zip(series.slice(s![turn - window.window_turns..turn]))
                {
                    *slot = v;
                }
                match windowed_tune(&naff, &mut buffer) {
                    Some(q) => *tune = q,
                    None => {
                        flat_windows.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Ok(())
        })?;

        let early = (0..samples)
            .filter(|t| t * window.step_turns <= window.window_turns)
            .count();
        let diagnostics = TuneDiagnostics {
            insufficient_history: early * particle_count,
            flat_windows: flat_windows.into_inner(),
            total_samples: samples * particle_count,
        };
        if diagnostics.flat_windows > 0 {
            log::warn!("{} tune windows had no oscillation", diagnostics.flat_windows);
        }

        let mut data = Array3::zeros((2, particle_count, samples));
        data.index_axis_mut(Axis(0), 0).assign(&tunes);
        for mut row in data.index_axis_mut(Axis(0), 1).rows_mut() {
            for (t, turn) in row.iter_mut().enumerate() {
                *turn = (t * window.step_turns) as f64;
            }
        }

        Ok(TuneSeries { data, diagnostics })
    }
}

/// Remove the window mean and estimate its tune; `None` for a flat or
/// incomplete window.
fn windowed_tune(naff: &Naff, buffer: &mut [f64]) -> Option<f64> {
    let mean = buffer.iter().sum::<f64>() / buffer.len() as f64;
    let mut spread = 0.0_f64;
    for v in buffer.iter_mut() {
        *v -= mean;
        spread = spread.max(v.abs());
    }
    // NaN marks coordinates of lost particles.
    if !mean.is_finite() || !spread.is_finite() || spread <= 16.0 * f64::EPSILON * mean.abs() {
        return None;
    }
    naff.fundamental(buffer)
}

/// Extract tunes on the default CPU backend.
pub fn extract_tunes(
    trajectories: ArrayView3<'_, f64>,
    particle_count: usize,
    step_turns: usize,
    window_turns: usize,
    axis: CoordinateAxis,
) -> Result<TuneSeries, CoreError> {
    let window = TuneWindow {
        window_turns,
        step_turns,
        axis,
    };
    TuneExtractor::default().extract(trajectories, particle_count, &window)
}
