//! Pre-trained artifacts: feature scaler and sequence reconstructor

pub mod loader;
pub mod reconstructor;
pub mod scaler;

pub use loader::{ArtifactLoader, LoadedArtifacts};
pub use reconstructor::{OnnxReconstructor, SequenceReconstructor};
pub use scaler::{FeatureScaler, StandardScaler};
