//! Mean absolute reconstruction error

use crate::error::{DetectorError, Result};
use ndarray::{ArrayView3, Axis, Zip};

/// Reconstruction error of one batch
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyScore {
    /// Mean absolute error over every (sequence, time step, feature) cell
    pub aggregate: f64,
    /// Mean absolute error of each sequence in the batch
    pub per_sequence: Vec<f64>,
}

/// Score a reconstruction against the array that was fed to the model.
///
/// The absolute error is averaged over the time axis first, giving one value
/// per (sequence, feature) pair, and that intermediate is then averaged into a
/// single aggregate for the whole batch. This is an L1 statistic; thresholds
/// are calibrated against it and would not transfer to squared error.
pub fn score(original: ArrayView3<'_, f32>, reconstructed: ArrayView3<'_, f32>) -> Result<AnomalyScore> {
    if original.shape() != reconstructed.shape() {
        return Err(DetectorError::DimensionMismatch {
            original: original.shape().to_vec(),
            reconstructed: reconstructed.shape().to_vec(),
        });
    }

    let mut abs_error = original.mapv(f64::from);
    Zip::from(&mut abs_error)
        .and(&reconstructed)
        .for_each(|err, &rec| *err = (f64::from(rec) - *err).abs());

    let empty = || DetectorError::EmptyBatch {
        shape: original.shape().to_vec(),
    };

    // (batch, time_steps, features) -> (batch, features)
    let per_feature = abs_error.mean_axis(Axis(1)).ok_or_else(empty)?;
    let aggregate = per_feature.mean().ok_or_else(empty)?;
    let per_sequence = per_feature
        .mean_axis(Axis(1))
        .ok_or_else(empty)?
        .to_vec();

    Ok(AnomalyScore {
        aggregate,
        per_sequence,
    })
}
