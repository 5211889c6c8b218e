//! Detection report printed by the CLI

use crate::pipeline::Detection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification label of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Benign,
    Fraud,
}

impl Verdict {
    pub fn from_flag(is_fraud: bool) -> Self {
        if is_fraud {
            Verdict::Fraud
        } else {
            Verdict::Benign
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Benign => write!(f, "BENIGN TRANSACTION"),
            Verdict::Fraud => write!(f, "FRAUD DETECTED"),
        }
    }
}

/// Result of one classified batch, ready for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Unique report identifier
    pub report_id: String,

    pub verdict: Verdict,

    /// Aggregate reconstruction error
    pub anomaly_score: f64,

    /// Threshold the score was compared against
    pub threshold: f64,

    /// Reconstruction error of each sequence
    pub per_sequence_scores: Vec<f64>,

    /// Inference latency in milliseconds
    pub latency_ms: f64,

    /// `(batch, time_steps, features)` of the scored input
    pub batch_shape: Vec<usize>,

    /// Report generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl DetectionReport {
    /// Create a report for a detection
    pub fn new(detection: &Detection, threshold: f64, batch_shape: Vec<usize>) -> Self {
        Self {
            report_id: uuid::Uuid::new_v4().to_string(),
            verdict: Verdict::from_flag(detection.is_fraud),
            anomaly_score: detection.anomaly_score,
            threshold,
            per_sequence_scores: detection.per_sequence_scores.clone(),
            latency_ms: detection.latency_ms,
            batch_shape,
            timestamp: Utc::now(),
        }
    }

    pub fn is_fraud(&self) -> bool {
        self.verdict == Verdict::Fraud
    }
}

impl fmt::Display for DetectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Latency: {:.2} ms", self.latency_ms)?;
        writeln!(
            f,
            "Anomaly Score: {:.4} (Threshold: {})",
            self.anomaly_score, self.threshold
        )?;
        if self.per_sequence_scores.len() > 1 {
            let scores: Vec<String> = self
                .per_sequence_scores
                .iter()
                .map(|s| format!("{:.4}", s))
                .collect();
            writeln!(f, "Per-sequence Scores: [{}]", scores.join(", "))?;
        }
        write!(f, "RESULT: {}", self.verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(is_fraud: bool, score: f64) -> Detection {
        Detection {
            is_fraud,
            anomaly_score: score,
            per_sequence_scores: vec![score],
            latency_ms: 1.25,
        }
    }

    #[test]
    fn test_report_text() {
        let report = DetectionReport::new(&detection(true, 0.25), 0.1949, vec![1, 20, 8]);
        let text = report.to_string();

        assert!(report.is_fraud());
        assert!(text.contains("Latency: 1.25 ms"));
        assert!(text.contains("Anomaly Score: 0.2500 (Threshold: 0.1949)"));
        assert!(text.ends_with("RESULT: FRAUD DETECTED"));
    }

    #[test]
    fn test_report_serialization() {
        let report = DetectionReport::new(&detection(false, 0.01), 0.1949, vec![1, 3, 4]);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"verdict\":\"benign\""));

        let deserialized: DetectionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.report_id, deserialized.report_id);
        assert_eq!(report.verdict, deserialized.verdict);
        assert_eq!(report.batch_shape, deserialized.batch_shape);
    }
}
