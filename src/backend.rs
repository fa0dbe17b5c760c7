//! Backend selection
//!
//! Inference runs on the NdArray CPU backend. Grad-CAM needs gradients of a
//! class score, so the model host is instantiated on the autodiff wrapper.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

/// Backend for plain forward passes
pub type InferenceBackend = burn_ndarray::NdArray;

/// Autodiff backend used by the model host for Grad-CAM gradients
pub type GradientBackend = Autodiff<InferenceBackend>;

/// Get the default device
pub fn default_device() -> <InferenceBackend as Backend>::Device {
    <InferenceBackend as Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    "NdArray (CPU)"
}
