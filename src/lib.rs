//! # Pneumonia CAM
//!
//! Explainable pneumonia screening for chest X-rays, built on the Burn framework.
//!
//! ## Features
//!
//! - **Deterministic inference** through a frozen convolutional classifier
//! - **Grad-CAM** saliency heatmaps at input resolution
//! - **Diagnosis records** with a label, a confidence band and a heatmap summary
//! - **Report payloads** carrying a heatmap overlay and templated text for an external renderer
//!
//! ## Modules
//!
//! - `imaging`: Decoding, resizing and normalization of uploads
//! - `model`: The `DiagnosticModel` contract, CNN backbone and model host
//! - `explain`: Grad-CAM and heatmap colorization
//! - `diagnosis`: Decision threshold, confidence bands and heatmap summary
//! - `report`: Overlay rendering and report fields
//! - `inference`: The end-to-end `DiagnosisService`
//! - `utils`: Configuration, logging and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pneumonia_cam::{DiagnosisConfig, DiagnosisRequest, DiagnosisService};
//!
//! let config = DiagnosisConfig::load("pneumonia_cam.toml".as_ref())?;
//! let service = DiagnosisService::initialize(&config)?;
//!
//! let bytes = std::fs::read("chest_xray.png")?;
//! let outcome = service.diagnose(&DiagnosisRequest::new(bytes))?;
//! println!("{}", outcome.payload.to_json()?);
//!
//! service.shutdown();
//! ```

pub mod backend;
pub mod diagnosis;
pub mod explain;
pub mod imaging;
pub mod inference;
pub mod model;
pub mod report;
pub mod utils;

// Re-export commonly used items for convenience
pub use diagnosis::{ConfidenceBand, DecisionConfig, DiagnosisAssembler, DiagnosisRecord, HeatmapSummary};
pub use explain::{GradCamEngine, HeatmapMap};
pub use imaging::{ImageDimensions, ImagePreprocessor, PreprocessConfig, PreprocessedTensor, RawImage};
pub use inference::{DiagnosisOutcome, DiagnosisRequest, DiagnosisService};
pub use model::{DiagnosisClass, DiagnosticModel, FeatureMap, ModelConfig, ModelHost, ModelMetadata};
pub use report::{Assessment, ReportConfig, ReportDataBuilder, ReportFields, ReportPayload};
pub use utils::config::DiagnosisConfig;
pub use utils::error::{ConfigError, DiagnosisError, InputError, ModelError, Result};

/// Default model input size (square)
pub const IMAGE_SIZE: u32 = model::config::DEFAULT_INPUT_SIZE;

/// Default decision threshold on the Pneumonia probability
pub const DEFAULT_THRESHOLD: f32 = diagnosis::DEFAULT_THRESHOLD;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
