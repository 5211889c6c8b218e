//! Configuration management for the fraud sequence detector

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Anomaly threshold derived from offline training-loss analysis
pub const DEFAULT_THRESHOLD: f64 = 0.1949;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub models: ModelsConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pre-trained artifact locations
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing the model and scaler artifacts
    pub models_dir: String,
    /// ONNX reconstruction model file name
    #[serde(default = "default_model_file")]
    pub model_file: String,
    /// Fitted scaler file name (JSON)
    #[serde(default = "default_scaler_file")]
    pub scaler_file: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_model_file() -> String {
    "fraud_detection_model.onnx".to_string()
}

fn default_scaler_file() -> String {
    "scaler.json".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

impl ModelsConfig {
    /// Full path of the reconstruction model
    pub fn model_path(&self) -> PathBuf {
        Path::new(&self.models_dir).join(&self.model_file)
    }

    /// Full path of the scaler artifact
    pub fn scaler_path(&self) -> PathBuf {
        Path::new(&self.models_dir).join(&self.scaler_file)
    }
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Reconstruction error above which a batch is classified as fraud
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models: ModelsConfig {
                models_dir: "models".to_string(),
                model_file: default_model_file(),
                scaler_file: default_scaler_file(),
                onnx_threads: 1,
            },
            detection: DetectionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
