//! Reconstruction-error scoring and threshold classification

pub mod classifier;
pub mod scorer;

pub use classifier::classify;
pub use scorer::{score, AnomalyScore};
