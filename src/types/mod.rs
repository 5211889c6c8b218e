//! Type definitions for the fraud sequence detector

pub mod batch;
pub mod report;

pub use batch::{NormalizedInput, TransactionBatch};
pub use report::{DetectionReport, Verdict};
