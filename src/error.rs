//! Error types for the detection pipeline

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which pre-trained artifact an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Model,
    Scaler,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Model => write!(f, "model"),
            ArtifactKind::Scaler => write!(f, "scaler"),
        }
    }
}

/// Errors raised while loading artifacts or classifying a batch
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Artifact file is absent at the configured location
    #[error("{kind} artifact missing at {}", path.display())]
    ArtifactMissing { kind: ArtifactKind, path: PathBuf },

    /// Artifact file exists but could not be parsed or loaded
    #[error("{kind} artifact at {} is invalid: {reason}", path.display())]
    ArtifactInvalid {
        kind: ArtifactKind,
        path: PathBuf,
        reason: String,
    },

    /// Feature axis does not match the scaler's expected feature count
    #[error("shape mismatch: expected {expected_features} features, got array of shape {actual_shape:?}")]
    ShapeMismatch {
        expected_features: usize,
        actual_shape: Vec<usize>,
    },

    /// Input is neither a single record nor a batch of sequences
    #[error("unsupported input rank {ndim}: expected (features,) or (batch, time_steps, features)")]
    InvalidRank { ndim: usize },

    /// Nested input whose sequences or records differ in length
    #[error("ragged batch: sequence {sequence} has {actual} {axis}, expected {expected}")]
    RaggedBatch {
        sequence: usize,
        axis: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Batch has a zero-length axis
    #[error("empty batch of shape {shape:?}")]
    EmptyBatch { shape: Vec<usize> },

    /// Original and reconstructed batches differ in shape
    #[error("dimension mismatch: original {original:?} vs reconstructed {reconstructed:?}")]
    DimensionMismatch {
        original: Vec<usize>,
        reconstructed: Vec<usize>,
    },

    /// Pipeline was used before its artifacts were loaded
    #[error("detection pipeline is not initialized")]
    NotInitialized,

    /// Model runtime failure
    #[error("inference failed: {0}")]
    Inference(String),
}

pub type Result<T> = std::result::Result<T, DetectorError>;

impl DetectorError {
    /// Startup failures that prevent the pipeline from ever becoming ready
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ArtifactMissing { .. } | Self::ArtifactInvalid { .. }
        )
    }

    /// Input shape problems, fixable only by correcting the batch
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::InvalidRank { .. }
                | Self::RaggedBatch { .. }
                | Self::EmptyBatch { .. }
                | Self::DimensionMismatch { .. }
        )
    }
}
