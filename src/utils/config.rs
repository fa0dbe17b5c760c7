//! Pipeline configuration
//!
//! One TOML file with a section per component. Every section and field has a
//! default, so an empty file (or no file) gives the stock deployment.
//!
//! ```toml
//! [model]
//! weights_path = "artifacts/pneumonia_classifier"
//! feature_layer = "conv4"
//!
//! [decision]
//! threshold = 0.5
//! ```

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::diagnosis::DecisionConfig;
use crate::imaging::PreprocessConfig;
use crate::model::ModelConfig;
use crate::report::ReportConfig;

/// Full configuration of the screening pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosisConfig {
    pub model: ModelConfig,
    pub preprocess: PreprocessConfig,
    pub decision: DecisionConfig,
    pub report: ReportConfig,
}

impl DiagnosisConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = load_toml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        self.preprocess.validate()?;
        self.decision.validate()?;
        self.report.validate()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize config: {e}")))
    }
}

/// Read a TOML file into any deserializable config type
pub fn load_toml_config<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
