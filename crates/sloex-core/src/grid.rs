//! Sampling grids.

/// `n` evenly spaced samples over `[start, end]`, both ends included.
///
/// A single sample is `start`; zero samples is an empty vector. The first
/// half is stepped from `start` and the second half from `end`, so the
/// endpoints are exact and a range symmetric about zero gives
/// `v[n - 1 - i] == -v[i]` bit for bit.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| {
                    if 2 * i + 1 == n {
                        0.5 * (start + end)
                    } else if 2 * i < n {
                        start + i as f64 * step
                    } else {
                        end - (n - 1 - i) as f64 * step
                    }
                })
                .collect()
        }
    }
}

/// Polar sampling of normalised phase space.
///
/// Radii are log-spaced over `[10^r_min_exp, 10^r_max_exp]`, angles
/// linearly spaced over `[-π, π]`. Meshes built on this grid are indexed
/// `[angle, radius]`.
#[derive(Debug, Clone)]
pub struct PolarGrid {
    pub r: Vec<f64>,
    pub phi: Vec<f64>,
}

impl PolarGrid {
    pub fn new(r_min_exp: f64, r_max_exp: f64, point_count: usize) -> Self {
        use std::f64::consts::PI;

        Self {
            r: linspace(r_min_exp, r_max_exp, point_count)
                .into_iter()
                .map(|e| 10f64.powf(e))
                .collect(),
            phi: linspace(-PI, PI, point_count),
        }
    }

    /// Mesh shape `(angles, radii)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.phi.len(), self.r.len())
    }
}
