//! Transaction sequence batches

use crate::error::{DetectorError, Result};
use ndarray::{Array2, Array3, ArrayD, ArrayView2, ArrayViewD, Ix1, Ix3};
use serde::{Deserialize, Serialize};

/// Raw input after dimensionality normalization
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedInput {
    /// A single bare record, promoted to `(1, features)`
    Record(Array2<f32>),
    /// A `(batch, time_steps, features)` batch
    Sequences(Array3<f32>),
}

impl NormalizedInput {
    /// Normalize a raw array.
    ///
    /// Only a rank-1 record is promoted; every other rank except 3 is rejected.
    pub fn from_array(raw: ArrayViewD<'_, f32>) -> Result<Self> {
        let normalized = match raw.ndim() {
            1 => {
                let record = raw
                    .into_dimensionality::<Ix1>()
                    .map_err(|_| DetectorError::InvalidRank { ndim: 1 })?;
                let features = record.len();
                let promoted = record
                    .as_standard_layout()
                    .into_owned()
                    .into_shape_with_order((1, features))
                    .map_err(|_| DetectorError::InvalidRank { ndim: 1 })?;
                NormalizedInput::Record(promoted)
            }
            // Permuted or Fortran-order inputs are copied into row-major order
            // so `rows` can flatten them without a copy.
            3 => NormalizedInput::Sequences(
                raw.into_dimensionality::<Ix3>()
                    .map_err(|_| DetectorError::InvalidRank { ndim: 3 })?
                    .as_standard_layout()
                    .into_owned(),
            ),
            ndim => return Err(DetectorError::InvalidRank { ndim }),
        };

        if normalized.shape().contains(&0) {
            return Err(DetectorError::EmptyBatch {
                shape: normalized.shape(),
            });
        }

        Ok(normalized)
    }

    /// Number of features per record
    pub fn features(&self) -> usize {
        match self {
            NormalizedInput::Record(record) => record.ncols(),
            NormalizedInput::Sequences(batch) => batch.dim().2,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            NormalizedInput::Record(record) => record.shape().to_vec(),
            NormalizedInput::Sequences(batch) => batch.shape().to_vec(),
        }
    }

    /// All records stacked as `(rows, features)` for the scaler
    pub fn rows(&self) -> Result<ArrayView2<'_, f32>> {
        match self {
            NormalizedInput::Record(record) => Ok(record.view()),
            NormalizedInput::Sequences(batch) => {
                let (n, t, f) = batch.dim();
                batch
                    .view()
                    .into_shape_with_order((n * t, f))
                    .map_err(|_| DetectorError::ShapeMismatch {
                        expected_features: f,
                        actual_shape: batch.shape().to_vec(),
                    })
            }
        }
    }

    /// `(batch, time_steps)` the scaled rows are reshaped back into.
    ///
    /// A promoted record becomes one sequence with a single time step.
    pub fn sequence_dims(&self) -> (usize, usize) {
        match self {
            NormalizedInput::Record(_) => (1, 1),
            NormalizedInput::Sequences(batch) => (batch.dim().0, batch.dim().1),
        }
    }
}

/// JSON form of a batch: sequences of records of feature values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionBatch {
    pub sequences: Vec<Vec<Vec<f32>>>,
}

impl TransactionBatch {
    /// Parse a batch from JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Convert to a dense `(batch, time_steps, features)` array.
    ///
    /// Ragged sequences or records are rejected.
    pub fn to_array(&self) -> Result<ArrayD<f32>> {
        let batch_size = self.sequences.len();
        let time_steps = self.sequences.first().map_or(0, Vec::len);
        let features = self
            .sequences
            .first()
            .and_then(|s| s.first())
            .map_or(0, Vec::len);

        for (index, sequence) in self.sequences.iter().enumerate() {
            if sequence.len() != time_steps {
                return Err(DetectorError::RaggedBatch {
                    sequence: index,
                    axis: "time steps",
                    expected: time_steps,
                    actual: sequence.len(),
                });
            }
            if let Some(record) = sequence.iter().find(|r| r.len() != features) {
                return Err(DetectorError::RaggedBatch {
                    sequence: index,
                    axis: "features",
                    expected: features,
                    actual: record.len(),
                });
            }
        }

        let values: Vec<f32> = self.sequences.iter().flatten().flatten().copied().collect();
        let array = Array3::from_shape_vec((batch_size, time_steps, features), values)
            .map_err(|_| DetectorError::ShapeMismatch {
                expected_features: features,
                actual_shape: vec![batch_size, time_steps, features],
            })?;

        Ok(array.into_dyn())
    }
}
