//! Inference module: the end-to-end screening pipeline
//!
//! This module provides:
//! - [`DiagnosisService`], which owns the loaded model and runs
//!   decode -> preprocess -> forward -> Grad-CAM -> record -> report
//! - Request and outcome types for one diagnosis
//!
//! The service is created once with [`DiagnosisService::initialize`] and can be
//! shared across workers; each request is handled end to end by the caller's
//! thread.

pub mod pipeline;

// Re-export main types for convenience
pub use pipeline::{DiagnosisOutcome, DiagnosisRequest, DiagnosisService};
