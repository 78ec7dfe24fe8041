//! Configuration types for background removal operations

use crate::{
    error::{BgRemovalError, Result},
    segmentation::RuleConstants,
    types::Sensitivity,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output image format options
///
/// Every variant keeps the alpha channel; formats without transparency are not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// Lossless WebP with alpha channel transparency
    WebP,
    /// TIFF with alpha channel transparency
    Tiff,
    /// Raw RGBA8 pixel data (4 bytes per pixel)
    Rgba8,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::WebP => write!(f, "webp"),
            Self::Tiff => write!(f, "tiff"),
            Self::Rgba8 => write!(f, "rgba8"),
        }
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Aggressiveness of the removal (0-100, higher removes more)
    pub sensitivity: f32,

    /// Output format
    pub output_format: OutputFormat,

    /// Run the pixel pass row-parallel (requires the `parallel` feature)
    pub parallel: bool,

    /// Maximum number of images processed at once in batch mode (0 = number of CPUs)
    pub max_concurrent_images: usize,

    /// Enable debug mode (additional logging and validation)
    pub debug: bool,

    /// Rule constants used by the classifier
    pub rules: RuleConstants,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::DEFAULT,
            output_format: OutputFormat::default(),
            parallel: true,
            max_concurrent_images: 0,
            debug: false,
            rules: RuleConstants::default(),
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pixel_bgremove::{OutputFormat, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .sensitivity(70.0)
    ///     .output_format(OutputFormat::WebP)
    ///     .debug(true)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.sensitivity, 70.0);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults. The loaded configuration is validated.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Malformed JSON
    /// - Values that fail [`RemovalConfig::validate`]
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read config file", path, &e))?;

        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - Sensitivity: finite, 0-100 (inclusive)
    /// - Rule constants: finite, non-negative variance limits
    ///
    /// # Errors
    /// - `InvalidSensitivity` for NaN, infinite or out-of-range sensitivity
    /// - `InvalidConfig` for unusable rule constants
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pixel_bgremove::RemovalConfig;
    ///
    /// let mut config = RemovalConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.sensitivity = 150.0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        Sensitivity::new(self.sensitivity)?;

        let limits = [
            ("edge variance margin", self.rules.edge_variance_margin),
            ("dark variance limit", self.rules.dark_variance_limit),
            ("high detail variance", self.rules.high_detail_variance),
        ];
        for (name, value) in limits {
            if !value.is_finite() || value < 0.0 {
                return Err(BgRemovalError::config_value_error(
                    name,
                    value,
                    "finite, >= 0",
                    None,
                ));
            }
        }

        if self.rules.skin_channel_gap < 0 {
            return Err(BgRemovalError::config_value_error(
                "skin channel gap",
                self.rules.skin_channel_gap,
                "0-255",
                Some(15),
            ));
        }

        Ok(())
    }

    /// Effective number of images processed concurrently
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrent_images == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        } else {
            self.max_concurrent_images
        }
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Set sensitivity, clamped into 0-100 (NaN falls back to the default)
    #[must_use]
    pub fn sensitivity(mut self, sensitivity: f32) -> Self {
        self.config.sensitivity = Sensitivity::clamped(sensitivity).value();
        self
    }

    /// Set output format
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Enable or disable the row-parallel pixel pass
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Set the batch concurrency limit (0 = number of CPUs)
    #[must_use]
    pub fn max_concurrent_images(mut self, limit: usize) -> Self {
        self.config.max_concurrent_images = limit;
        self
    }

    /// Enable debug mode
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Override the classifier constants
    #[must_use]
    pub fn rules(mut self, rules: RuleConstants) -> Self {
        self.config.rules = rules;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Any error reported by [`RemovalConfig::validate`].
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RemovalConfig::default();
        assert_eq!(config.sensitivity, 50.0);
        assert_eq!(config.output_format, OutputFormat::Png);
        assert!(config.parallel);
        assert_eq!(config.max_concurrent_images, 0);
        assert!(!config.debug);
        assert_eq!(config.rules, RuleConstants::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RemovalConfig::builder()
            .sensitivity(80.0)
            .output_format(OutputFormat::Tiff)
            .parallel(false)
            .max_concurrent_images(3)
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.sensitivity, 80.0);
        assert_eq!(config.output_format, OutputFormat::Tiff);
        assert!(!config.parallel);
        assert_eq!(config.max_concurrent_images, 3);
        assert_eq!(config.effective_concurrency(), 3);
        assert!(config.debug);
    }

    #[test]
    fn test_builder_sensitivity_clamping() {
        let high = RemovalConfig::builder().sensitivity(250.0).build().unwrap();
        assert_eq!(high.sensitivity, 100.0);

        let low = RemovalConfig::builder().sensitivity(-5.0).build().unwrap();
        assert_eq!(low.sensitivity, 0.0);

        let nan = RemovalConfig::builder().sensitivity(f32::NAN).build().unwrap();
        assert_eq!(nan.sensitivity, 50.0);
    }

    #[test]
    fn test_validation_rejects_bad_sensitivity() {
        let mut config = RemovalConfig::default();

        config.sensitivity = 100.1;
        assert!(matches!(
            config.validate(),
            Err(BgRemovalError::InvalidSensitivity(_))
        ));

        config.sensitivity = f32::NAN;
        assert!(config.validate().is_err());

        config.sensitivity = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_rule_constants() {
        let mut config = RemovalConfig::default();
        config.rules.high_detail_variance = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(BgRemovalError::InvalidConfig(_))
        ));

        let mut config = RemovalConfig::default();
        config.rules.skin_channel_gap = -1;
        assert!(config.validate().is_err());

        let err = RemovalConfig::builder()
            .rules(RuleConstants {
                dark_variance_limit: -3.0,
                ..RuleConstants::default()
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("dark variance limit"));
    }

    #[test]
    fn test_effective_concurrency_auto() {
        assert!(RemovalConfig::default().effective_concurrency() >= 1);
    }

    #[test]
    fn test_output_format_display_and_serde() {
        assert_eq!(OutputFormat::WebP.to_string(), "webp");
        assert_eq!(OutputFormat::Rgba8.to_string(), "rgba8");

        let json = serde_json::to_string(&OutputFormat::Tiff).unwrap();
        assert_eq!(json, "\"tiff\"");
        let parsed: OutputFormat = serde_json::from_str("\"webp\"").unwrap();
        assert_eq!(parsed, OutputFormat::WebP);
    }

    #[test]
    fn test_config_serde_roundtrip_with_defaults() {
        let config: RemovalConfig =
            serde_json::from_str(r#"{"sensitivity": 65.0, "rules": {"edge_band": 4}}"#).unwrap();
        assert_eq!(config.sensitivity, 65.0);
        assert_eq!(config.rules.edge_band, 4);
        assert_eq!(config.rules.high_detail_variance, 60.0);
        assert_eq!(config.output_format, OutputFormat::Png);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"sensitivity": 20.0, "output_format": "tiff"}}"#).unwrap();

        let config = RemovalConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.sensitivity, 20.0);
        assert_eq!(config.output_format, OutputFormat::Tiff);
    }

    #[test]
    fn test_from_json_file_errors() {
        let mut bad_json = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad_json, "not json").unwrap();
        assert!(matches!(
            RemovalConfig::from_json_file(bad_json.path()),
            Err(BgRemovalError::InvalidConfig(_))
        ));

        let mut out_of_range = tempfile::NamedTempFile::new().unwrap();
        writeln!(out_of_range, r#"{{"sensitivity": 400.0}}"#).unwrap();
        assert!(matches!(
            RemovalConfig::from_json_file(out_of_range.path()),
            Err(BgRemovalError::InvalidSensitivity(_))
        ));

        assert!(matches!(
            RemovalConfig::from_json_file("/nonexistent/config.json"),
            Err(BgRemovalError::Io(_))
        ));
    }
}
