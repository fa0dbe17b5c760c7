//! Diagnosis service

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::backend::{backend_name, default_device, GradientBackend};
use crate::diagnosis::{DiagnosisAssembler, DiagnosisRecord};
use crate::explain::{GradCamEngine, HeatmapMap};
use crate::imaging::preprocess::INPUT_CHANNELS;
use crate::imaging::{ImagePreprocessor, RawImage};
use crate::model::{DiagnosisClass, DiagnosticModel, ModelHost, ModelMetadata};
use crate::report::{ReportContext, ReportDataBuilder, ReportPayload};
use crate::utils::config::DiagnosisConfig;
use crate::utils::error::{DiagnosisError, ModelError, Result};

/// One diagnosis request
#[derive(Debug, Clone, Default)]
pub struct DiagnosisRequest {
    /// Encoded JPEG or PNG bytes
    pub image_bytes: Vec<u8>,
    /// Overrides the configured decision threshold
    pub threshold: Option<f32>,
    pub study_id: Option<String>,
}

impl DiagnosisRequest {
    pub fn new(image_bytes: Vec<u8>) -> Self {
        Self {
            image_bytes,
            ..Default::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_study_id(mut self, study_id: impl Into<String>) -> Self {
        self.study_id = Some(study_id.into());
        self
    }
}

/// Result of one diagnosis
#[derive(Debug, Clone)]
pub struct DiagnosisOutcome {
    pub heatmap: HeatmapMap,
    pub payload: ReportPayload,
    /// Wall time of the whole request
    pub elapsed_ms: f64,
}

impl DiagnosisOutcome {
    pub fn record(&self) -> &DiagnosisRecord {
        &self.payload.record
    }
}

/// Screening pipeline around one loaded model
pub struct DiagnosisService {
    model: Arc<dyn DiagnosticModel>,
    preprocessor: ImagePreprocessor,
    engine: GradCamEngine,
    assembler: DiagnosisAssembler,
    reporter: ReportDataBuilder,
}

impl DiagnosisService {
    /// Load the configured model and build the pipeline around it
    pub fn initialize(config: &DiagnosisConfig) -> Result<Self> {
        config.validate()?;

        info!("Initializing diagnosis service on {}", backend_name());
        let host = ModelHost::<GradientBackend>::load(&config.model, default_device())?;

        Self::with_model(Arc::new(host), config)
    }

    /// Build the pipeline around an already loaded model
    ///
    /// The model section of `config` is ignored; the model's own metadata
    /// decides the input size.
    pub fn with_model(model: Arc<dyn DiagnosticModel>, config: &DiagnosisConfig) -> Result<Self> {
        config.preprocess.validate()?;
        config.decision.validate()?;
        config.report.validate()?;

        let metadata = model.metadata();
        if metadata.input_channels != INPUT_CHANNELS {
            return Err(ModelError::ModelLoadFailure(format!(
                "model expects {} input channels, the preprocessor produces {}",
                metadata.input_channels, INPUT_CHANNELS
            ))
            .into());
        }

        let preprocessor = ImagePreprocessor::new(config.preprocess.clone(), metadata.input_size);
        let reporter = ReportDataBuilder::new(config.report.clone(), metadata.name.clone());

        info!(
            "Diagnosis service ready: model '{}', input {}, threshold {:.2}",
            metadata.name, metadata.input_size, config.decision.threshold
        );

        Ok(Self {
            model,
            preprocessor,
            engine: GradCamEngine::new(),
            assembler: DiagnosisAssembler::new(config.decision.clone()),
            reporter,
        })
    }

    pub fn metadata(&self) -> &ModelMetadata {
        self.model.metadata()
    }

    /// Threshold used when a request does not override it
    pub fn default_threshold(&self) -> f32 {
        self.assembler.config().threshold
    }

    /// Run the full pipeline on one request
    pub fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisOutcome> {
        let start = Instant::now();

        let threshold = request.threshold.unwrap_or_else(|| self.default_threshold());
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(DiagnosisError::InvalidArgument(format!(
                "threshold must be a finite value in [0, 1], got {}",
                threshold
            )));
        }

        let raw = RawImage::decode(&request.image_bytes)?;
        debug!(
            "Decoded {:?} image {} ({} channels)",
            raw.format(),
            raw.dimensions(),
            raw.channels()
        );

        let tensor = self.preprocessor.preprocess(&raw)?;

        let forward = self.model.forward(&tensor)?;
        debug!(
            "Feature layer {} activations {:?}",
            self.metadata().feature_layer,
            forward.activations.shape()
        );

        let gradient = self
            .model
            .gradient_of_class_score(&tensor, DiagnosisClass::Pneumonia)?;
        let heatmap = self.engine.compute_heatmap(
            &gradient.activations,
            &gradient.gradients,
            tensor.dimensions(),
        )?;

        let record = self.assembler.assemble(forward.probability, &heatmap, threshold)?;

        let mut context = ReportContext::now();
        context.study_id = request.study_id.clone();
        let payload = self
            .reporter
            .build_with_context(&record, &raw, &heatmap, context)?;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            "Diagnosis: {} (p={:.3}, {} confidence) in {:.1}ms",
            record.label(),
            record.probability(),
            record.confidence_band(),
            elapsed_ms
        );

        Ok(DiagnosisOutcome {
            heatmap,
            payload,
            elapsed_ms,
        })
    }

    /// Release the model
    pub fn shutdown(self) {
        info!("Shutting down diagnosis service ('{}')", self.model.metadata().name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_support::encode;
    use crate::imaging::{ImageDimensions, PreprocessedTensor};
    use crate::model::{ClassScoreGradient, FeatureMap, ForwardOutput, NUM_CLASSES};
    use crate::utils::error::InputError;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    /// Fixed probability; activations follow the red channel on a 4x4 grid
    struct FixedModel {
        metadata: ModelMetadata,
        probability: f32,
    }

    impl FixedModel {
        fn new(probability: f32) -> Self {
            Self {
                metadata: ModelMetadata {
                    name: "fixed".to_string(),
                    input_channels: 3,
                    input_size: ImageDimensions::square(16),
                    num_classes: NUM_CLASSES,
                    feature_layer: "conv2".to_string(),
                },
                probability,
            }
        }

        fn activations(tensor: &PreprocessedTensor) -> FeatureMap {
            let values = tensor.values();
            let pooled = (0..16)
                .map(|i| values[(i / 4) * 4 * 16 + (i % 4) * 4])
                .collect();
            FeatureMap::new(1, 4, 4, pooled).unwrap()
        }
    }

    impl DiagnosticModel for FixedModel {
        fn metadata(&self) -> &ModelMetadata {
            &self.metadata
        }

        fn forward(&self, tensor: &PreprocessedTensor) -> std::result::Result<ForwardOutput, ModelError> {
            self.metadata.check_input(tensor)?;
            Ok(ForwardOutput {
                probability: self.probability,
                activations: Self::activations(tensor),
            })
        }

        fn gradient_of_class_score(
            &self,
            tensor: &PreprocessedTensor,
            class: DiagnosisClass,
        ) -> std::result::Result<ClassScoreGradient, ModelError> {
            self.metadata.check_input(tensor)?;
            Ok(ClassScoreGradient {
                class,
                activations: Self::activations(tensor),
                gradients: FeatureMap::new(1, 4, 4, vec![1.0; 16]).unwrap(),
            })
        }
    }

    fn service(probability: f32) -> DiagnosisService {
        DiagnosisService::with_model(
            Arc::new(FixedModel::new(probability)),
            &DiagnosisConfig::default(),
        )
        .unwrap()
    }

    fn bright_spot_png() -> Vec<u8> {
        let img = RgbImage::from_fn(32, 32, |x, y| {
            if x >= 24 && y < 8 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        encode(&DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[test]
    fn test_diagnose_produces_record_and_overlay() {
        let outcome = service(0.927)
            .diagnose(&DiagnosisRequest::new(bright_spot_png()).with_study_id("S-1"))
            .unwrap();

        let record = outcome.record();
        assert_eq!(record.label(), DiagnosisClass::Pneumonia);
        assert_eq!(outcome.heatmap.dimensions(), ImageDimensions::square(16));
        assert_eq!(outcome.payload.overlay_dimensions, ImageDimensions::square(16));
        assert_eq!(outcome.payload.fields.study_id, "S-1");

        // Saliency sits in the top-right corner
        let (row, col) = record.heatmap_summary().peak.unwrap();
        assert!(row < 8 && col >= 8, "peak at ({}, {})", row, col);
    }

    #[test]
    fn test_threshold_override() {
        let service = service(0.55);
        let bytes = bright_spot_png();

        let default = service.diagnose(&DiagnosisRequest::new(bytes.clone())).unwrap();
        assert_eq!(default.record().label(), DiagnosisClass::Pneumonia);

        let strict = service
            .diagnose(&DiagnosisRequest::new(bytes).with_threshold(0.6))
            .unwrap();
        assert_eq!(strict.record().label(), DiagnosisClass::Normal);
        assert_eq!(strict.record().threshold(), 0.6);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = service(0.5)
            .diagnose(&DiagnosisRequest::new(bright_spot_png()).with_threshold(f32::NAN))
            .unwrap_err();
        assert!(matches!(err, DiagnosisError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty_upload_rejected() {
        let err = service(0.5)
            .diagnose(&DiagnosisRequest::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            DiagnosisError::Input(InputError::InvalidImageFormat(_))
        ));
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let mut model = FixedModel::new(0.5);
        model.metadata.input_channels = 1;

        let err = DiagnosisService::with_model(Arc::new(model), &DiagnosisConfig::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DiagnosisError::Model(ModelError::ModelLoadFailure(_))
        ));
    }
}
