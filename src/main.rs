//! Fraud Sequence Detector - Main Entry Point
//!
//! Loads the autoencoder and scaler, scores a batch of transaction sequences,
//! and prints the verdict.
//!
//! Usage:
//!   fraud-sequence-detector --config config/config.toml
//!   fraud-sequence-detector --input batch.json --format json
//!   fraud-sequence-detector --batch-size 8 --time-steps 20 --iterations 100

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use fraud_sequence_detector::{
    config::{AppConfig, LoggingConfig},
    metrics::LatencyMetrics,
    pipeline::DetectionPipeline,
    types::{DetectionReport, TransactionBatch},
};
use ndarray::{Array3, ArrayD};
use rand::Rng;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "fraud-sequence-detector")]
#[command(about = "Reconstruction-error fraud detection for transaction sequences")]
struct Cli {
    /// Path to the configuration file (defaults are used when absent)
    #[arg(short, long, default_value = "config/config.toml")]
    config: PathBuf,

    /// JSON batch: an array of sequences of feature records
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Time steps per generated sequence
    #[arg(long, default_value_t = 20)]
    time_steps: usize,

    /// Sequences per generated batch
    #[arg(long, default_value_t = 1)]
    batch_size: usize,

    /// Number of times to classify the batch
    #[arg(long, default_value_t = 1)]
    iterations: usize,

    /// Override the configured anomaly threshold
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        format!("fraud_sequence_detector={}", logging.level).parse()?,
    );

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = if cli.config.exists() {
        AppConfig::load_from_path(&cli.config)?
    } else {
        AppConfig::default()
    };

    if let Some(threshold) = cli.threshold {
        config.detection.threshold = threshold;
    }
    Ok(config)
}

/// Uniform random batch shaped for the loaded scaler
fn random_batch(batch_size: usize, time_steps: usize, features: usize) -> ArrayD<f32> {
    let mut rng = rand::thread_rng();
    Array3::from_shape_simple_fn((batch_size, time_steps, features), || rng.gen::<f32>())
        .into_dyn()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_logging(&config.logging)?;

    info!("Initializing fraud sequence detector");
    info!(
        model = %config.models.model_path().display(),
        scaler = %config.models.scaler_path().display(),
        threshold = config.detection.threshold,
        "Configuration loaded"
    );

    let pipeline = DetectionPipeline::new(&config).context("Failed to initialize detector")?;
    let features = pipeline
        .expected_features()
        .context("Detector did not reach ready state")?;

    let batch = match &cli.input {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read batch from {}", path.display()))?;
            TransactionBatch::from_json(&json)
                .context("Failed to parse transaction batch")?
                .to_array()?
        }
        None => {
            info!(
                batch_size = cli.batch_size,
                time_steps = cli.time_steps,
                features,
                "Generating random transaction batch"
            );
            random_batch(cli.batch_size, cli.time_steps, features)
        }
    };

    let metrics = LatencyMetrics::new();
    let mut last = None;
    for _ in 0..cli.iterations.max(1) {
        let detection = pipeline.classify_batch(batch.view())?;
        metrics.record(&detection);
        last = Some(detection);
    }

    let Some(detection) = last else {
        return Ok(());
    };

    if detection.is_fraud {
        warn!(
            anomaly_score = detection.anomaly_score,
            threshold = pipeline.threshold(),
            "Fraudulent transaction pattern detected"
        );
    }

    let report = DetectionReport::new(&detection, pipeline.threshold(), batch.shape().to_vec());
    match cli.format {
        OutputFormat::Text => println!("{}", report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if cli.iterations > 1 {
        metrics.print_summary();
    }

    Ok(())
}
