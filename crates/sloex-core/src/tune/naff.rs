//! Fundamental-frequency estimation in the spirit of NAFF (Laskar's
//! numerical analysis of fundamental frequencies).
//!
//! The signal is multiplied by a Hann window, a zero-padded FFT locates the
//! strongest line, and the line is refined by maximising
//!
//! $$ A(\nu) = \Bigl|\sum_k \chi_k\, x_k\, e^{-2\pi i \nu k}\Bigr| $$
//!
//! with a golden-section search inside one padded bin of the FFT peak.
//! For real input the estimate lies in `[0, 0.5]` (tune units).

use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

/// Zero-padding factor applied on top of the next power of two.
const PADDING: usize = 4;

/// Stop refining once the bracket is narrower than this (tune units).
const REFINE_TOLERANCE: f64 = 1e-12;

/// Spectral amplitude below which a window is treated as flat.
const FLAT_THRESHOLD: f64 = 1e-300;

/// Single-frequency analyser for windows of a fixed length.
pub struct Naff {
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
    padded_len: usize,
}

impl std::fmt::Debug for Naff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Naff")
            .field("len", &self.window.len())
            .field("padded_len", &self.padded_len)
            .finish()
    }
}

impl Naff {
    /// Plan an analyser for signals of `len` samples.
    pub fn new(len: usize) -> Self {
        let padded_len = len.max(1).next_power_of_two() * PADDING;
        let fft = FftPlanner::new().plan_fft_forward(padded_len);
        Self {
            window: hann(len),
            fft,
            padded_len,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Dominant frequency of `signal` in turns⁻¹, or `None` for a flat
    /// window. `signal` must have the planned length and should already
    /// have its mean removed.
    pub fn fundamental(&self, signal: &[f64]) -> Option<f64> {
        assert_eq!(signal.len(), self.window.len(), "Signal length must match the planned window");

        let windowed: Vec<f64> = signal.iter().zip(&self.window).map(|(x, w)| x * w).collect();

        let mut buffer = vec![Complex64::new(0.0, 0.0); self.padded_len];
        for (slot, &v) in buffer.iter_mut().zip(&windowed) {
            *slot = Complex64::new(v, 0.0);
        }
        self.fft.process(&mut buffer);

        let half = self.padded_len / 2;
        let (peak_bin, peak) = buffer[..=half]
            .iter()
            .map(|c| c.norm())
            .enumerate()
            .fold((0, 0.0), |best, (i, mag)| if mag > best.1 { (i, mag) } else { best });
        if peak.is_nan() || peak <= FLAT_THRESHOLD {
            return None;
        }

        let bin = 1.0 / self.padded_len as f64;
        let centre = peak_bin as f64 * bin;
        let lo = (centre - bin).max(0.0);
        let hi = (centre + bin).min(0.5);
        Some(golden_section_max(|nu| amplitude(&windowed, nu), lo, hi))
    }
}

/// Hann window `1 − cos(2πk/(N−1))`.
fn hann(len: usize) -> Vec<f64> {
    if len < 2 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f64;
    (0..len)
        .map(|k| 1.0 - (2.0 * std::f64::consts::PI * k as f64 / denom).cos())
        .collect()
}

/// Magnitude of the windowed Fourier integral at frequency `nu`.
fn amplitude(windowed: &[f64], nu: f64) -> f64 {
    let step = -2.0 * std::f64::consts::PI * nu;
    let (re, im) = windowed
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(re, im), (k, &v)| {
            let (s, c) = (step * k as f64).sin_cos();
            (re + v * c, im + v * s)
        });
    re.hypot(im)
}

fn golden_section_max(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> f64 {
    let ratio = (5f64.sqrt() - 1.0) / 2.0;
    let mut a = hi - ratio * (hi - lo);
    let mut b = lo + ratio * (hi - lo);
    let (mut fa, mut fb) = (f(a), f(b));

    while hi - lo > REFINE_TOLERANCE {
        if fa < fb {
            lo = a;
            a = b;
            fa = fb;
            b = lo + ratio * (hi - lo);
            fb = f(b);
        } else {
            hi = b;
            b = a;
            fb = fa;
            a = hi - ratio * (hi - lo);
            fa = f(a);
        }
    }
    0.5 * (lo + hi)
}
