//! Fraud Sequence Detector Library
//!
//! Scores batches of transaction sequences for fraud by the reconstruction
//! error of a pretrained sequence autoencoder.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod types;

pub use config::AppConfig;
pub use error::{DetectorError, Result};
pub use models::{FeatureScaler, SequenceReconstructor};
pub use pipeline::{Detection, DetectionPipeline};
pub use types::{batch::TransactionBatch, report::DetectionReport};
