//! Utilities module for configuration, logging, and error types
//!
//! This module provides:
//! - Structured logging with tracing
//! - The TOML configuration of the whole pipeline
//! - Error handling types
//! - Small formatting helpers for the CLI

pub mod config;
pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use config::DiagnosisConfig;
pub use error::{ConfigError, DiagnosisError, InputError, ModelError, Result};
pub use logging::init_logging;

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.25), "250ms");
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
    }
}
