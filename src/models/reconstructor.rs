//! Sequence reconstruction model

use crate::error::{DetectorError, Result};
use ndarray::{Array3, ArrayView3, Ix3};
use ort::session::Session;
use ort::value::TensorRef;
use std::sync::Mutex;
use tracing::debug;

/// Learned function that reproduces a `(batch, time_steps, features)` batch.
///
/// Implementations must be deterministic for a fixed input and keep no state
/// between calls.
pub trait SequenceReconstructor: Send + Sync {
    fn reconstruct(&self, batch: ArrayView3<'_, f32>) -> Result<Array3<f32>>;
}

/// Autoencoder served through ONNX Runtime
pub struct OnnxReconstructor {
    /// ONNX Runtime session (running requires exclusive access)
    session: Mutex<Session>,
    /// Input name for the model
    input_name: String,
    /// Output name for the reconstruction
    output_name: String,
}

impl OnnxReconstructor {
    pub(crate) fn new(session: Session, input_name: String, output_name: String) -> Self {
        Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        }
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    fn run(&self, batch: ArrayView3<'_, f32>) -> anyhow::Result<Array3<f32>> {
        let input = batch.as_standard_layout().into_owned();
        let input_tensor = TensorRef::from_array_view(&input)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        let reconstruction = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix3>()?
            .to_owned();

        Ok(reconstruction)
    }
}

impl SequenceReconstructor for OnnxReconstructor {
    fn reconstruct(&self, batch: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        let reconstruction = self
            .run(batch)
            .map_err(|e| DetectorError::Inference(format!("{e:#}")))?;

        debug!(
            input_shape = ?batch.shape(),
            output_shape = ?reconstruction.shape(),
            "Sequence reconstructed"
        );

        Ok(reconstruction)
    }
}
