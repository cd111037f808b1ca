//! SpMV run functor and the `tune_multiply` entry points.

use crate::features::SparseFeatures;
use crate::ml::{tune_ml, Classifier, ModelTuner};
use anyhow::Result;
use formtune_autotune::{tune, RunFirstFunctor, RunFirstTuner};
use formtune_sparse::{DynamicMatrix, ExecutionSpace, FormatId};
use ndarray::Array1;
use tracing::debug;

/// Times `y = A * x` with `A` converted into each candidate [`FormatId`].
///
/// `x` is filled with `2.0`. Reported timings are per multiply.
#[derive(Debug, Clone, Default)]
pub struct MultiplyFunctor {
    space: ExecutionSpace,
    x: Array1<f64>,
    y: Array1<f64>,
    runs_per_sample: usize,
}

impl MultiplyFunctor {
    pub fn new(space: ExecutionSpace) -> Self {
        Self {
            space,
            ..Self::default()
        }
    }

    pub fn space(&self) -> ExecutionSpace {
        self.space
    }

    /// Output of the last multiply.
    pub fn output(&self) -> &Array1<f64> {
        &self.y
    }
}

impl RunFirstFunctor for MultiplyFunctor {
    type Data = DynamicMatrix;
    type Device = DynamicMatrix;
    type Host = DynamicMatrix;

    fn clone_data(&mut self, data: &DynamicMatrix) -> Result<DynamicMatrix> {
        self.x = Array1::from_elem(data.ncols(), 2.0);
        self.y = Array1::zeros(data.nrows());
        Ok(data.clone())
    }

    fn clone_host(&mut self, device: &DynamicMatrix) -> Result<DynamicMatrix> {
        Ok(device.clone())
    }

    fn state_transition(
        &mut self,
        tuner: &RunFirstTuner,
        device: &mut DynamicMatrix,
        host: &mut DynamicMatrix,
        current_state: &mut Option<usize>,
    ) -> bool {
        self.runs_per_sample = tuner.repetitions_per_state();
        let target = tuner.current_state();
        if *current_state == Some(target) {
            return true;
        }

        let format = match FormatId::try_from(target) {
            Ok(format) => format,
            Err(err) => {
                debug!(%err, "state has no storage format");
                return false;
            }
        };
        match host.convert(format) {
            Ok(()) => {
                *device = host.clone();
                *current_state = Some(target);
                debug!(%format, "converted tuning matrix");
                true
            }
            Err(err) => {
                debug!(%format, %err, "conversion failed");
                false
            }
        }
    }

    fn run(&mut self, device: &DynamicMatrix) -> Result<()> {
        device.multiply(self.x.view(), self.y.view_mut(), self.space)?;
        Ok(())
    }

    fn postprocess_runtime(&self, seconds: f64) -> f64 {
        seconds / self.runs_per_sample.max(1) as f64
    }
}

/// Selects a storage format for SpMV on `matrix`.
pub trait TuneMultiply {
    /// Returns the elected state, a [`FormatId`] index for the run-first
    /// tuner and the model's prediction for the ML tuners.
    fn tune_multiply(&mut self, matrix: &DynamicMatrix, space: ExecutionSpace) -> Result<usize>;
}

impl TuneMultiply for RunFirstTuner {
    fn tune_multiply(&mut self, matrix: &DynamicMatrix, space: ExecutionSpace) -> Result<usize> {
        let mut functor = MultiplyFunctor::new(space);
        tune(matrix, &mut functor, self)?;
        Ok(self.best_state_id()?)
    }
}

impl<M: Classifier> TuneMultiply for ModelTuner<M> {
    fn tune_multiply(&mut self, matrix: &DynamicMatrix, space: ExecutionSpace) -> Result<usize> {
        tune_ml(matrix, &mut SparseFeatures { space }, self)
    }
}
