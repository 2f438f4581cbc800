//! CPU compute backend using Rayon for shared-memory parallelism.

use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

/// CPU backend that parallelises work across threads via Rayon.
///
/// By default work runs on the global Rayon pool. [`CpuBackend::with_threads`]
/// builds a dedicated pool so a job can be confined to a fixed thread count.
pub struct CpuBackend {
    num_threads: usize,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend with a dedicated pool of `num_threads` threads.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("sloex-worker-{i}"))
            .build()
            .map_err(|e| ComputeError::Unavailable(e.to_string()))?;
        log::debug!("Built dedicated rayon pool with {} threads", pool.current_num_threads());
        Ok(Self {
            num_threads: pool.current_num_threads(),
            pool: Some(Arc::new(pool)),
        })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads),
        }
    }

    fn parallel_matrix_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_fn: &(dyn Fn(usize, usize) -> f64 + Send + Sync),
    ) -> Result<Array2<f64>, ComputeError> {
        let data: Vec<f64> = self.install(|| {
            (0..rows * cols)
                .into_par_iter()
                .map(|idx| fill_fn(idx / cols, idx % cols))
                .collect()
        });

        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| ComputeError::DeviceError(e.to_string()))
    }

    fn parallel_row_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_fn: &(dyn Fn(usize, &mut [f64]) -> Result<(), ComputeError> + Send + Sync),
    ) -> Result<Array2<f64>, ComputeError> {
        // par_chunks_mut rejects a zero chunk size
        if cols == 0 {
            return Ok(Array2::zeros((rows, 0)));
        }

        let mut data = vec![0.0; rows * cols];
        self.install(|| {
            data.par_chunks_mut(cols)
                .enumerate()
                .try_for_each(|(row, out)| fill_fn(row, out))
        })?;

        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| ComputeError::DeviceError(e.to_string()))
    }
}
