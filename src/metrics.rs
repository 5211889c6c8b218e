//! Latency and verdict statistics across repeated classifications.

use crate::pipeline::Detection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::info;

/// Keep at most this many latency samples
const MAX_SAMPLES: usize = 10_000;

/// Metrics collector for classification runs
pub struct LatencyMetrics {
    /// Total batches classified
    pub batches_processed: AtomicU64,
    /// Batches classified as fraud
    pub fraud_detected: AtomicU64,
    /// Inference latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
}

impl LatencyMetrics {
    pub fn new() -> Self {
        Self {
            batches_processed: AtomicU64::new(0),
            fraud_detected: AtomicU64::new(0),
            latencies: RwLock::new(Vec::with_capacity(1000)),
        }
    }

    /// Record a classified batch
    pub fn record(&self, detection: &Detection) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        if detection.is_fraud {
            self.fraud_detected.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut latencies) = self.latencies.write() {
            latencies.push((detection.latency_ms * 1000.0).round() as u64);
            // Keep only the most recent samples
            if latencies.len() > MAX_SAMPLES {
                latencies.drain(0..MAX_SAMPLES / 2);
            }
        }
    }

    /// Latency statistics over the retained samples
    pub fn get_latency_stats(&self) -> LatencyStats {
        let mut sorted = match self.latencies.read() {
            Ok(latencies) if !latencies.is_empty() => latencies.clone(),
            _ => return LatencyStats::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Fraction of batches classified as fraud
    pub fn fraud_rate(&self) -> f64 {
        let total = self.batches_processed.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.fraud_detected.load(Ordering::Relaxed) as f64 / total as f64
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let batches = self.batches_processed.load(Ordering::Relaxed);
        let frauds = self.fraud_detected.load(Ordering::Relaxed);
        let stats = self.get_latency_stats();

        info!(
            batches,
            frauds,
            fraud_rate = format!("{:.1}%", self.fraud_rate() * 100.0),
            "Classification summary"
        );
        info!(
            mean_us = stats.mean_us,
            p50_us = stats.p50_us,
            p95_us = stats.p95_us,
            p99_us = stats.p99_us,
            max_us = stats.max_us,
            "Inference latency"
        );
    }
}

impl Default for LatencyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}
