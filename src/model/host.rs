//! Model host: owns the frozen classifier and exposes it as a
//! [`DiagnosticModel`].
//!
//! Two copies of the module are kept: one on the inner backend for plain
//! inference, one on the autodiff backend for gradient passes. Every gradient
//! pass builds a fresh graph from a detached feature-layer leaf, so no
//! gradient state survives a request. Gradient passes on a shared host are
//! serialized by a `Mutex`; plain inference only locks long enough to take a
//! cheap handle clone of the eval copy and then runs unlocked.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use burn::{
    module::{AutodiffModule, Module},
    record::{CompactRecorder, Recorder},
    tensor::{
        activation::softmax,
        backend::{AutodiffBackend, Backend},
        Tensor, TensorData,
    },
};
use tracing::{debug, info};

use super::cnn::{ChestXrayClassifier, ChestXrayClassifierRecord};
use super::config::ModelConfig;
use super::{
    ClassScoreGradient, DiagnosisClass, DiagnosticModel, FeatureMap, ForwardOutput, ModelMetadata,
    NUM_CLASSES,
};
use crate::imaging::PreprocessedTensor;
use crate::utils::error::ModelError;

/// Frozen classifier shared read-only by all requests
pub struct ModelHost<B: AutodiffBackend> {
    metadata: ModelMetadata,
    feature_index: usize,
    device: B::Device,
    eval_model: Mutex<ChestXrayClassifier<B::InnerBackend>>,
    grad_model: Mutex<ChestXrayClassifier<B>>,
}

impl<B: AutodiffBackend> ModelHost<B> {
    /// Load trained weights described by `config`
    ///
    /// `weights_path` is given without extension; the recorder appends its own.
    pub fn load(config: &ModelConfig, device: B::Device) -> Result<Self, ModelError> {
        config
            .validate()
            .map_err(|e| ModelError::ModelLoadFailure(e.to_string()))?;

        let path = config.weights_path.as_ref().ok_or_else(|| {
            ModelError::ModelLoadFailure("model.weights_path is not set".to_string())
        })?;

        info!("Loading classifier weights from {}", path.display());

        let record: ChestXrayClassifierRecord<B> =
            <CompactRecorder as Recorder<B>>::load(&CompactRecorder::new(), path.clone(), &device)
                .map_err(|e| {
                    ModelError::ModelLoadFailure(format!("{}: {:?}", path.display(), e))
                })?;

        let architecture = config.architecture();
        architecture
            .check_record(&record)
            .map_err(|e| ModelError::ModelLoadFailure(format!("{}: {}", path.display(), e)))?;

        let module = ChestXrayClassifier::<B>::new(&architecture, &device).load_record(record);

        Self::from_module(module, config.metadata(), device)
    }

    /// Wrap an already constructed module
    pub fn from_module(
        module: ChestXrayClassifier<B>,
        metadata: ModelMetadata,
        device: B::Device,
    ) -> Result<Self, ModelError> {
        if metadata.num_classes != NUM_CLASSES || module.num_classes() != NUM_CLASSES {
            return Err(ModelError::ModelLoadFailure(format!(
                "expected a {}-class classifier, metadata declares {} and module has {}",
                NUM_CLASSES,
                metadata.num_classes,
                module.num_classes()
            )));
        }

        let feature_index = module.layer_index(&metadata.feature_layer).ok_or_else(|| {
            ModelError::ModelLoadFailure(format!(
                "feature layer '{}' not found (available: {})",
                metadata.feature_layer,
                module.layer_names().join(", ")
            ))
        })?;

        info!(
            "Model '{}' ready: input {:?}, Grad-CAM layer {}",
            metadata.name,
            metadata.input_shape(),
            metadata.feature_layer
        );

        Ok(Self {
            metadata,
            feature_index,
            eval_model: Mutex::new(module.valid()),
            grad_model: Mutex::new(module),
            device,
        })
    }

    /// Write a randomly initialized record, for smoke tests without a trained artifact
    pub fn write_initial_weights(
        config: &ModelConfig,
        path: &Path,
        device: &B::Device,
    ) -> Result<(), ModelError> {
        config
            .validate()
            .map_err(|e| ModelError::ModelLoadFailure(e.to_string()))?;

        ChestXrayClassifier::<B>::new(&config.architecture(), device)
            .save_file(path.to_path_buf(), &CompactRecorder::new())
            .map_err(|e| ModelError::Backend(format!("failed to save record: {:?}", e)))
    }

    fn input_tensor(&self, tensor: &PreprocessedTensor) -> Tensor<B::InnerBackend, 4> {
        let [c, h, w] = tensor.shape();
        let data = TensorData::new(tensor.values().to_vec(), [1, c, h, w]);
        Tensor::from_data(data, &self.device)
    }
}

impl<B: AutodiffBackend> DiagnosticModel for ModelHost<B> {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn forward(&self, tensor: &PreprocessedTensor) -> Result<ForwardOutput, ModelError> {
        self.metadata.check_input(tensor)?;

        let model = lock(&self.eval_model)?.clone();
        let input = self.input_tensor(tensor);
        let activations = model.features(input, self.feature_index);
        let logits = model.head(activations.clone(), self.feature_index);

        let probabilities = to_vec(softmax(logits, 1))?;
        let probability = probabilities
            .get(DiagnosisClass::Pneumonia.index())
            .copied()
            .ok_or_else(|| ModelError::Backend("classifier produced no Pneumonia score".into()))?
            .clamp(0.0, 1.0);

        debug!("Forward pass: p(pneumonia) = {:.4}", probability);

        Ok(ForwardOutput {
            probability,
            activations: to_feature_map(activations)?,
        })
    }

    fn gradient_of_class_score(
        &self,
        tensor: &PreprocessedTensor,
        class: DiagnosisClass,
    ) -> Result<ClassScoreGradient, ModelError> {
        self.metadata.check_input(tensor)?;

        let model = lock(&self.grad_model)?;
        let input = Tensor::<B, 4>::from_inner(self.input_tensor(tensor));

        // Fresh leaf: the backward pass stops at the feature layer
        let activations = model
            .features(input, self.feature_index)
            .detach()
            .require_grad();
        let logits = model.head(activations.clone(), self.feature_index);

        let c = class.index();
        let score = logits.slice([0..1, c..c + 1]).sum();
        let grads = score.backward();

        let gradients = activations.grad(&grads).ok_or_else(|| {
            ModelError::Backend("no gradient reached the feature layer".to_string())
        })?;

        Ok(ClassScoreGradient {
            class,
            activations: to_feature_map(activations.inner())?,
            gradients: to_feature_map(gradients)?,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, ModelError> {
    mutex
        .lock()
        .map_err(|_| ModelError::Backend("model lock poisoned".to_string()))
}

fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, ModelError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| ModelError::Backend(format!("failed to read tensor: {:?}", e)))
}

fn to_feature_map<B: Backend>(tensor: Tensor<B, 4>) -> Result<FeatureMap, ModelError> {
    let [_, channels, height, width] = tensor.dims();
    FeatureMap::new(channels, height, width, to_vec(tensor)?)
}
