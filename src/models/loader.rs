//! Artifact loader for the scaler and the ONNX reconstruction model

use crate::config::ModelsConfig;
use crate::error::{ArtifactKind, DetectorError, Result};
use crate::models::reconstructor::OnnxReconstructor;
use crate::models::scaler::StandardScaler;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

/// Scaler and reconstructor loaded from disk
pub struct LoadedArtifacts {
    pub scaler: StandardScaler,
    pub reconstructor: OnnxReconstructor,
}

/// Loader for the pre-trained artifacts
pub struct ArtifactLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ArtifactLoader {
    /// Create a loader with the specified number of inference threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Fail unless the artifact exists at `path`
    pub fn ensure_present(path: &Path, kind: ArtifactKind) -> Result<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(DetectorError::ArtifactMissing {
                kind,
                path: path.to_path_buf(),
            })
        }
    }

    /// Load both artifacts.
    ///
    /// Presence of both files is checked before either is parsed, so a missing
    /// artifact is reported without paying for model initialisation.
    pub fn load(&self, config: &ModelsConfig) -> Result<LoadedArtifacts> {
        let model_path = config.model_path();
        let scaler_path = config.scaler_path();

        Self::ensure_present(&model_path, ArtifactKind::Model)?;
        Self::ensure_present(&scaler_path, ArtifactKind::Scaler)?;

        let reconstructor = self.load_model(&model_path)?;
        let scaler = StandardScaler::load(&scaler_path)?;

        Ok(LoadedArtifacts {
            scaler,
            reconstructor,
        })
    }

    /// Load the ONNX reconstruction model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<OnnxReconstructor> {
        let path = path.as_ref();
        Self::ensure_present(path, ArtifactKind::Model)?;

        info!(path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = self
            .build_session(path)
            .map_err(|e| DetectorError::ArtifactInvalid {
                kind: ArtifactKind::Model,
                path: path.to_path_buf(),
                reason: format!("{e:#}"),
            })?;

        let input_name =
            first_io_name(session.inputs.iter().map(|i| i.name.as_str()), "inputs", path)?;
        let output_name =
            first_io_name(session.outputs.iter().map(|o| o.name.as_str()), "outputs", path)?;

        info!(
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(OnnxReconstructor::new(session, input_name, output_name))
    }

    fn build_session(&self, path: &Path) -> anyhow::Result<Session> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)?;
        Ok(session)
    }
}

/// First declared graph input or output name. A graph that declares none
/// cannot be fed, so it is rejected at load time.
fn first_io_name<'a>(
    mut names: impl Iterator<Item = &'a str>,
    role: &str,
    path: &Path,
) -> Result<String> {
    names
        .next()
        .map(str::to_string)
        .ok_or_else(|| DetectorError::ArtifactInvalid {
            kind: ArtifactKind::Model,
            path: path.to_path_buf(),
            reason: format!("model graph declares no {role}"),
        })
}

impl Default for ArtifactLoader {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}
