//! Threshold classification

/// Returns `true` when the score is strictly above the threshold.
///
/// A score equal to the threshold is benign. A NaN score compares false and
/// is therefore classified benign as well; callers that need to treat NaN as
/// suspicious must check for it before calling.
pub fn classify(score: f64, threshold: f64) -> bool {
    score > threshold
}
