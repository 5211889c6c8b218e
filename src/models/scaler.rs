//! Fitted feature scaler

use crate::error::{ArtifactKind, DetectorError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Maps raw feature rows into the distribution the reconstructor was trained on.
///
/// Implementations are fitted offline and never mutated after load.
pub trait FeatureScaler: Send + Sync {
    /// Number of columns every input row must have
    fn expected_features(&self) -> usize;

    /// Transform a `(rows, expected_features)` array, preserving its shape.
    ///
    /// Fails with [`DetectorError::ShapeMismatch`] on a wrong column count.
    fn transform(&self, batch: ArrayView2<'_, f32>) -> Result<Array2<f32>>;
}

/// On-disk form of a fitted standard scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerArtifact {
    pub n_features_in: usize,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Per-column standardisation: `(x - mean) / scale`
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f32>,
    scale: Array1<f32>,
}

impl StandardScaler {
    /// Build a scaler from fitted parameters.
    ///
    /// Scale entries that are zero or subnormal in `f32` (constant training
    /// columns) are replaced by 1. Non-finite parameters are rejected.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> std::result::Result<Self, String> {
        if mean.is_empty() {
            return Err("scaler has no features".to_string());
        }
        if mean.len() != scale.len() {
            return Err(format!(
                "mean has {} entries but scale has {}",
                mean.len(),
                scale.len()
            ));
        }

        let mean: Array1<f32> = mean.into_iter().map(|m| m as f32).collect();
        if let Some(column) = mean.iter().position(|m| !m.is_finite()) {
            return Err(format!("mean of column {} is not finite in f32", column));
        }

        let scale: Array1<f32> = scale.into_iter().map(|s| s as f32).collect();
        if let Some(column) = scale.iter().position(|s| !s.is_finite()) {
            return Err(format!("scale of column {} is not finite in f32", column));
        }
        let scale = scale.mapv(|s| if s.is_normal() { s } else { 1.0 });

        Ok(Self { mean, scale })
    }

    /// Load a fitted scaler from its JSON artifact
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let invalid = |reason: String| DetectorError::ArtifactInvalid {
            kind: ArtifactKind::Scaler,
            path: path.to_path_buf(),
            reason,
        };

        let data = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let artifact: ScalerArtifact =
            serde_json::from_str(&data).map_err(|e| invalid(e.to_string()))?;

        if artifact.mean.len() != artifact.n_features_in {
            return Err(invalid(format!(
                "n_features_in is {} but {} means were stored",
                artifact.n_features_in,
                artifact.mean.len()
            )));
        }

        let scaler = Self::new(artifact.mean, artifact.scale).map_err(invalid)?;
        info!(
            path = %path.display(),
            features = scaler.expected_features(),
            "Scaler loaded"
        );
        Ok(scaler)
    }

    /// Scaler that leaves values unchanged
    pub fn identity(features: usize) -> Self {
        Self {
            mean: Array1::zeros(features),
            scale: Array1::ones(features),
        }
    }
}

impl FeatureScaler for StandardScaler {
    fn expected_features(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, batch: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        if batch.len_of(Axis(1)) != self.expected_features() {
            return Err(DetectorError::ShapeMismatch {
                expected_features: self.expected_features(),
                actual_shape: batch.shape().to_vec(),
            });
        }

        Ok((&batch - &self.mean) / &self.scale)
    }
}
