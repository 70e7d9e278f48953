//! Tool configuration.
//!
//! One [`ToolConfig`] parameterizes the upload gate, the workflow's
//! user-facing text, and the reference matte. The defaults match the
//! shipped background remover; a deployment can override any field
//! from JSON.

use serde::{Deserialize, Serialize};

use crate::types::ConfigError;

/// Largest colour distance between two RGB pixels (`sqrt(3 * 255^2)`).
pub const MAX_COLOR_DISTANCE: f32 = 441.7;

/// Configuration for the upload gate and the tool workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Largest accepted upload, in bytes.
    pub max_file_size: u64,

    /// MIME types the upload gate admits.
    pub accepted_types: Vec<String>,

    /// Appended to the source base name for the downloaded file.
    pub download_suffix: String,

    /// Shown when a transformation fails. The underlying cause is
    /// logged, never displayed.
    pub failure_message: String,

    /// Settings for the bundled matte transformation.
    pub matte: MatteConfig,
}

impl ToolConfig {
    /// Default upload limit: 5 MiB.
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

    /// Default accepted MIME types.
    pub const DEFAULT_ACCEPTED_TYPES: [&'static str; 3] = ["image/jpeg", "image/png", "image/webp"];

    /// Default download suffix.
    pub const DEFAULT_DOWNLOAD_SUFFIX: &'static str = "-no-bg";

    /// Default failure message.
    pub const DEFAULT_FAILURE_MESSAGE: &'static str =
        "Processing failed. Please try a different image.";

    /// Parse a config from JSON and validate it.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON, or any error
    /// from [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroMaxFileSize`],
    /// [`ConfigError::NoAcceptedTypes`], or the matte's own error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size == 0 {
            return Err(ConfigError::ZeroMaxFileSize);
        }
        if self.accepted_types.is_empty() {
            return Err(ConfigError::NoAcceptedTypes);
        }
        self.matte.validate()
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
            accepted_types: Self::DEFAULT_ACCEPTED_TYPES
                .iter()
                .map(|&t| t.to_owned())
                .collect(),
            download_suffix: Self::DEFAULT_DOWNLOAD_SUFFIX.to_owned(),
            failure_message: Self::DEFAULT_FAILURE_MESSAGE.to_owned(),
            matte: MatteConfig::default(),
        }
    }
}

/// Settings for [`matte::remove_background`](crate::matte::remove_background).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatteConfig {
    /// Euclidean RGB distance from the estimated background colour
    /// within which a border-connected pixel counts as background.
    pub tolerance: f32,

    /// Soften the cut edge by giving foreground pixels that touch the
    /// background half alpha.
    pub feather: bool,
}

impl MatteConfig {
    /// Default keying tolerance.
    pub const DEFAULT_TOLERANCE: f32 = 48.0;

    /// Check field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ToleranceOutOfRange`] when the tolerance
    /// is negative, NaN, or larger than [`MAX_COLOR_DISTANCE`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if (0.0..=MAX_COLOR_DISTANCE).contains(&self.tolerance) {
            Ok(())
        } else {
            Err(ConfigError::ToleranceOutOfRange(self.tolerance))
        }
    }
}

impl Default for MatteConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            feather: true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ToolConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = ToolConfig::from_json(r#"{"download_suffix": "-cutout"}"#).unwrap();
        assert_eq!(config.download_suffix, "-cutout");
        assert_eq!(config.max_file_size, ToolConfig::DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.accepted_types.len(), 3);
        assert_eq!(config.matte, MatteConfig::default());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = ToolConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_size_limit_is_rejected() {
        let err = ToolConfig::from_json(r#"{"max_file_size": 0}"#).unwrap_err();
        assert_eq!(err, ConfigError::ZeroMaxFileSize);
    }

    #[test]
    fn empty_type_list_is_rejected() {
        let err = ToolConfig::from_json(r#"{"accepted_types": []}"#).unwrap_err();
        assert_eq!(err, ConfigError::NoAcceptedTypes);
    }

    #[test]
    fn tolerance_bounds() {
        for bad in [-1.0, 500.0, f32::NAN] {
            let matte = MatteConfig {
                tolerance: bad,
                ..MatteConfig::default()
            };
            assert!(matte.validate().is_err(), "tolerance {bad} should be rejected");
        }
        let edge = MatteConfig {
            tolerance: 0.0,
            feather: false,
        };
        assert!(edge.validate().is_ok());
    }
}
