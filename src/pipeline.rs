//! Detection pipeline: scale, reconstruct, score and classify a batch

use crate::config::{AppConfig, ModelsConfig};
use crate::error::{DetectorError, Result};
use crate::models::loader::ArtifactLoader;
use crate::models::reconstructor::SequenceReconstructor;
use crate::models::scaler::FeatureScaler;
use crate::scoring::{classify, score};
use crate::types::batch::NormalizedInput;
use ndarray::{Array2, ArrayView3, ArrayViewD, CowArray, Ix2};
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of classifying one batch
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// `anomaly_score > threshold`
    pub is_fraud: bool,
    /// Aggregate mean absolute reconstruction error
    pub anomaly_score: f64,
    /// Reconstruction error of each sequence in the batch
    pub per_sequence_scores: Vec<f64>,
    /// Wall-clock time of reconstruction and scoring
    pub latency_ms: f64,
}

/// Artifacts held once the pipeline is ready
struct Ready {
    scaler: Box<dyn FeatureScaler>,
    reconstructor: Box<dyn SequenceReconstructor>,
}

enum PipelineState {
    Uninitialized,
    Ready(Ready),
}

/// Reconstruction-error fraud detector.
///
/// Artifacts are loaded once and never mutated, so a ready pipeline can be
/// shared across threads. The threshold is fixed at construction.
pub struct DetectionPipeline {
    state: PipelineState,
    threshold: f64,
}

impl DetectionPipeline {
    /// Load both artifacts and return a ready pipeline.
    ///
    /// Fails with [`DetectorError::ArtifactMissing`] if either artifact is absent.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut pipeline = Self::uninitialized(config.detection.threshold);
        pipeline.initialize(&config.models)?;
        Ok(pipeline)
    }

    /// Ready pipeline from already-loaded collaborators
    pub fn from_parts<S, R>(scaler: S, reconstructor: R, threshold: f64) -> Self
    where
        S: FeatureScaler + 'static,
        R: SequenceReconstructor + 'static,
    {
        Self {
            state: PipelineState::Ready(Ready {
                scaler: Box::new(scaler),
                reconstructor: Box::new(reconstructor),
            }),
            threshold,
        }
    }

    /// Pipeline whose artifacts have not been loaded yet
    pub fn uninitialized(threshold: f64) -> Self {
        Self {
            state: PipelineState::Uninitialized,
            threshold,
        }
    }

    /// Load artifacts and move to the ready state.
    ///
    /// On failure the pipeline stays uninitialized. Calling this on a ready
    /// pipeline does nothing.
    pub fn initialize(&mut self, config: &ModelsConfig) -> Result<()> {
        if self.is_ready() {
            debug!("Detection pipeline already initialized");
            return Ok(());
        }

        info!(models_dir = %config.models_dir, "Initializing detection pipeline");

        let artifacts = ArtifactLoader::with_threads(config.onnx_threads).load(config)?;
        self.state = PipelineState::Ready(Ready {
            scaler: Box::new(artifacts.scaler),
            reconstructor: Box::new(artifacts.reconstructor),
        });

        info!(
            expected_features = self.expected_features().unwrap_or_default(),
            threshold = self.threshold,
            "Detection pipeline ready"
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, PipelineState::Ready(_))
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Feature count every record must have, once ready
    pub fn expected_features(&self) -> Option<usize> {
        match &self.state {
            PipelineState::Ready(ready) => Some(ready.scaler.expected_features()),
            PipelineState::Uninitialized => None,
        }
    }

    fn ready(&self) -> Result<&Ready> {
        match &self.state {
            PipelineState::Ready(ready) => Ok(ready),
            PipelineState::Uninitialized => Err(DetectorError::NotInitialized),
        }
    }

    /// Scale raw records without running the model.
    ///
    /// Accepts `(rows, features)` or a single `(features,)` record, which is
    /// promoted to one row.
    pub fn preprocess(&self, records: ArrayViewD<'_, f32>) -> Result<Array2<f32>> {
        let ready = self.ready()?;

        let rows: CowArray<'_, f32, Ix2> = match records.ndim() {
            1 => records
                .to_shape((1, records.len()))
                .map_err(|_| DetectorError::InvalidRank { ndim: 1 })?,
            2 => records
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|_| DetectorError::InvalidRank { ndim: 2 })?
                .into(),
            ndim => return Err(DetectorError::InvalidRank { ndim }),
        };

        ready.scaler.transform(rows.view())
    }

    /// Classify a `(batch, time_steps, features)` batch, or a single
    /// `(features,)` record treated as a one-step sequence.
    ///
    /// Shape errors surface before the model runs. Nothing is retried.
    pub fn classify_batch(&self, batch: ArrayViewD<'_, f32>) -> Result<Detection> {
        let ready = self.ready()?;
        let expected_features = ready.scaler.expected_features();

        let input = NormalizedInput::from_array(batch)?;
        if input.features() != expected_features {
            return Err(DetectorError::ShapeMismatch {
                expected_features,
                actual_shape: input.shape(),
            });
        }

        let scaled_rows = ready.scaler.transform(input.rows()?)?;
        let (batch_size, time_steps) = input.sequence_dims();
        let scaled = scaled_rows
            .to_shape((batch_size, time_steps, expected_features))
            .map_err(|_| DetectorError::ShapeMismatch {
                expected_features,
                actual_shape: scaled_rows.shape().to_vec(),
            })?
            .into_owned();

        // Error is measured in scaled space, against exactly what the model saw.
        let start = Instant::now();
        let reconstruction = ready.reconstructor.reconstruct(scaled.view())?;
        let anomaly = score(scaled.view(), reconstruction.view())?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let is_fraud = classify(anomaly.aggregate, self.threshold);

        debug!(
            batch_size,
            time_steps,
            anomaly_score = anomaly.aggregate,
            threshold = self.threshold,
            is_fraud,
            latency_ms,
            "Batch classified"
        );

        Ok(Detection {
            is_fraud,
            anomaly_score: anomaly.aggregate,
            per_sequence_scores: anomaly.per_sequence,
            latency_ms,
        })
    }

    /// Classify an already three-dimensional batch
    pub fn classify_sequences(&self, batch: ArrayView3<'_, f32>) -> Result<Detection> {
        self.classify_batch(batch.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scaler::StandardScaler;
    use ndarray::{array, Array, Array3, IxDyn, ShapeBuilder};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct IdentityReconstructor;

    impl SequenceReconstructor for IdentityReconstructor {
        fn reconstruct(&self, batch: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
            Ok(batch.to_owned())
        }
    }

    struct ZeroReconstructor;

    impl SequenceReconstructor for ZeroReconstructor {
        fn reconstruct(&self, batch: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
            Ok(Array3::zeros(batch.raw_dim()))
        }
    }

    /// Reconstructs every value as its negation plus one
    struct SkewedReconstructor;

    impl SequenceReconstructor for SkewedReconstructor {
        fn reconstruct(&self, batch: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
            Ok(batch.mapv(|v| 1.0 - v))
        }
    }

    struct CountingReconstructor {
        calls: Arc<AtomicUsize>,
    }

    impl SequenceReconstructor for CountingReconstructor {
        fn reconstruct(&self, batch: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(batch.to_owned())
        }
    }

    /// Drops the last time step
    struct TruncatingReconstructor;

    impl SequenceReconstructor for TruncatingReconstructor {
        fn reconstruct(&self, batch: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
            let (n, t, f) = batch.dim();
            Ok(Array3::zeros((n, t.saturating_sub(1), f)))
        }
    }

    fn sample_batch(shape: (usize, usize, usize)) -> Array3<f32> {
        Array3::from_shape_fn(shape, |(b, t, f)| ((b * 31 + t * 7 + f * 3) % 11) as f32 / 10.0)
    }

    #[test]
    fn test_perfect_reconstruction_is_benign() {
        let pipeline =
            DetectionPipeline::from_parts(StandardScaler::identity(4), IdentityReconstructor, 0.1949);

        let detection = pipeline
            .classify_sequences(sample_batch((3, 10, 4)).view())
            .unwrap();

        assert_eq!(detection.anomaly_score, 0.0);
        assert!(!detection.is_fraud);
        assert_eq!(detection.per_sequence_scores, vec![0.0; 3]);
        assert!(detection.latency_ms >= 0.0);
    }

    #[test]
    fn test_zero_reconstruction_of_ones() {
        let pipeline =
            DetectionPipeline::from_parts(StandardScaler::identity(4), ZeroReconstructor, 0.1949);

        let detection = pipeline
            .classify_sequences(Array3::<f32>::ones((1, 3, 4)).view())
            .unwrap();

        assert_eq!(detection.anomaly_score, 1.0);
        assert!(detection.is_fraud);
    }

    #[test]
    fn test_score_equal_to_threshold_is_benign() {
        let pipeline =
            DetectionPipeline::from_parts(StandardScaler::identity(4), ZeroReconstructor, 1.0);

        let detection = pipeline
            .classify_sequences(Array3::<f32>::ones((1, 3, 4)).view())
            .unwrap();

        assert_eq!(detection.anomaly_score, 1.0);
        assert!(!detection.is_fraud);
    }

    #[test]
    fn test_score_is_non_negative_and_deterministic() {
        let pipeline =
            DetectionPipeline::from_parts(StandardScaler::identity(5), SkewedReconstructor, 0.5);
        let batch = sample_batch((4, 6, 5));

        let first = pipeline.classify_sequences(batch.view()).unwrap();
        let second = pipeline.classify_sequences(batch.view()).unwrap();

        assert!(first.anomaly_score >= 0.0);
        assert!(first.per_sequence_scores.iter().all(|&s| s >= 0.0));
        assert_eq!(first.anomaly_score, second.anomaly_score);
        assert_eq!(first.is_fraud, second.is_fraud);
        assert_eq!(first.per_sequence_scores, second.per_sequence_scores);
    }

    #[test]
    fn test_error_measured_in_scaled_space() {
        // Scaling maps 3.0 to 1.0, so a zero reconstruction costs 1.0, not 3.0.
        let scaler = StandardScaler::new(vec![1.0; 2], vec![2.0; 2]).unwrap();
        let pipeline = DetectionPipeline::from_parts(scaler, ZeroReconstructor, 0.1949);

        let batch = Array3::<f32>::from_elem((1, 2, 2), 3.0);
        let detection = pipeline.classify_sequences(batch.view()).unwrap();

        assert_eq!(detection.anomaly_score, 1.0);
    }

    #[test]
    fn test_feature_mismatch_rejected_before_reconstruction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = DetectionPipeline::from_parts(
            StandardScaler::identity(4),
            CountingReconstructor {
                calls: calls.clone(),
            },
            0.1949,
        );

        let err = pipeline
            .classify_sequences(Array3::<f32>::zeros((1, 3, 5)).view())
            .unwrap_err();

        assert!(matches!(
            err,
            DetectorError::ShapeMismatch {
                expected_features: 4,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        pipeline
            .classify_sequences(Array3::<f32>::zeros((1, 3, 4)).view())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_permuted_layout_batch_is_scored() {
        let pipeline =
            DetectionPipeline::from_parts(StandardScaler::identity(4), ZeroReconstructor, 0.1949);

        let storage = Array3::<f32>::ones((4, 3, 2));
        let reversed = storage.view().reversed_axes();
        assert_eq!(reversed.shape(), &[2, 3, 4]);

        let detection = pipeline.classify_sequences(reversed).unwrap();
        assert_eq!(detection.anomaly_score, 1.0);
        assert!(detection.is_fraud);

        let fortran = Array3::from_shape_vec((2, 3, 4).f(), (0..24).map(|v| v as f32).collect())
            .unwrap();
        let from_fortran = pipeline.classify_sequences(fortran.view()).unwrap();
        let from_standard = pipeline
            .classify_sequences(fortran.as_standard_layout().view())
            .unwrap();
        assert_eq!(from_fortran.anomaly_score, from_standard.anomaly_score);
        assert_eq!(from_fortran.per_sequence_scores, from_standard.per_sequence_scores);
    }

    #[test]
    fn test_unsupported_rank_rejected() {
        let pipeline =
            DetectionPipeline::from_parts(StandardScaler::identity(4), IdentityReconstructor, 0.1949);
        let matrix = Array::<f32, _>::zeros(IxDyn(&[3, 4]));

        assert!(matches!(
            pipeline.classify_batch(matrix.view()),
            Err(DetectorError::InvalidRank { ndim: 2 })
        ));
    }

    #[test]
    fn test_reconstruction_shape_change_propagates() {
        let pipeline = DetectionPipeline::from_parts(
            StandardScaler::identity(4),
            TruncatingReconstructor,
            0.1949,
        );

        let err = pipeline
            .classify_sequences(Array3::<f32>::zeros((2, 3, 4)).view())
            .unwrap_err();
        assert!(matches!(err, DetectorError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_single_record_promotion() {
        let scaler = StandardScaler::new(vec![0.5, 0.0, 1.0], vec![2.0, 1.0, 4.0]).unwrap();
        let pipeline = DetectionPipeline::from_parts(scaler, ZeroReconstructor, 0.1949);

        let record = array![1.5_f32, -2.0, 9.0];
        let as_row = record.clone().into_shape_with_order((1, 3)).unwrap();

        let scaled_record = pipeline.preprocess(record.view().into_dyn()).unwrap();
        let scaled_row = pipeline.preprocess(as_row.view().into_dyn()).unwrap();
        assert_eq!(scaled_record, scaled_row);
        assert_eq!(scaled_record, array![[0.5_f32, -2.0, 2.0]]);

        let stored_reversed = array![9.0_f32, -2.0, 1.5];
        let reversed = stored_reversed.slice(ndarray::s![..;-1]);
        assert_eq!(pipeline.preprocess(reversed.into_dyn()).unwrap(), scaled_record);

        let from_record = pipeline.classify_batch(record.view().into_dyn()).unwrap();
        let from_sequence = pipeline
            .classify_sequences(record.into_shape_with_order((1, 1, 3)).unwrap().view())
            .unwrap();
        assert_eq!(from_record.anomaly_score, from_sequence.anomaly_score);
        assert_eq!(from_record.is_fraud, from_sequence.is_fraud);
        assert!((from_record.anomaly_score - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_missing_model_artifact_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.models.models_dir = dir.path().to_string_lossy().into_owned();

        let err = DetectionPipeline::new(&config).err().unwrap();
        assert!(err.is_fatal());
        assert!(matches!(err, DetectorError::ArtifactMissing { .. }));

        let mut pipeline = DetectionPipeline::uninitialized(config.detection.threshold);
        assert!(pipeline.initialize(&config.models).is_err());
        assert!(!pipeline.is_ready());
        assert_eq!(pipeline.expected_features(), None);
    }

    #[test]
    fn test_unloadable_model_leaves_pipeline_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fraud_detection_model.onnx"), b"not a model").unwrap();
        std::fs::write(
            dir.path().join("scaler.json"),
            r#"{"n_features_in": 4, "mean": [0.0, 0.0, 0.0, 0.0], "scale": [1.0, 1.0, 1.0, 1.0]}"#,
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.models.models_dir = dir.path().to_string_lossy().into_owned();

        let mut pipeline = DetectionPipeline::uninitialized(config.detection.threshold);
        let err = pipeline.initialize(&config.models).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            DetectorError::ArtifactInvalid {
                kind: crate::error::ArtifactKind::Model,
                ..
            }
        ));
        assert!(!pipeline.is_ready());
        assert!(matches!(
            pipeline.classify_sequences(Array3::<f32>::ones((1, 3, 4)).view()),
            Err(DetectorError::NotInitialized)
        ));
    }

    #[test]
    fn test_not_initialized() {
        let pipeline = DetectionPipeline::uninitialized(0.1949);
        let batch = Array3::<f32>::ones((1, 3, 4));

        assert!(matches!(
            pipeline.classify_sequences(batch.view()),
            Err(DetectorError::NotInitialized)
        ));
        assert!(matches!(
            pipeline.preprocess(array![1.0_f32].into_dyn().view()),
            Err(DetectorError::NotInitialized)
        ));
    }

    #[test]
    fn test_pipeline_is_shareable_across_threads() {
        let pipeline = Arc::new(DetectionPipeline::from_parts(
            StandardScaler::identity(4),
            ZeroReconstructor,
            0.1949,
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = pipeline.clone();
                std::thread::spawn(move || {
                    pipeline
                        .classify_sequences(Array3::<f32>::ones((2, 3, 4)).view())
                        .unwrap()
                        .anomaly_score
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1.0);
        }
    }
}
