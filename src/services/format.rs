//! Output format handling service
//!
//! Maps `OutputFormat` to file extensions and `image` crate formats, keeping that
//! table out of the processor and CLI.

use crate::config::OutputFormat;
use image::ImageFormat;

/// Service for handling output format lookups
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Get the appropriate file extension for a given output format
    ///
    /// # Examples
    /// ```rust
    /// use pixel_bgremove::{services::OutputFormatHandler, OutputFormat};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Rgba8), "raw");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Rgba8 => "raw",
        }
    }

    /// Parse an output format from a file extension or CLI name (case-insensitive)
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<OutputFormat> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::WebP),
            "tif" | "tiff" => Some(OutputFormat::Tiff),
            "raw" | "rgba" | "rgba8" => Some(OutputFormat::Rgba8),
            _ => None,
        }
    }

    /// Check if a format supports transparency (alpha channel)
    ///
    /// All output formats keep alpha; the check stays so callers don't hardcode that.
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png | OutputFormat::WebP | OutputFormat::Tiff | OutputFormat::Rgba8 => {
                true
            },
        }
    }

    /// The `image` crate encoder for a format, `None` for raw pixel output
    #[must_use]
    pub fn image_format(format: OutputFormat) -> Option<ImageFormat> {
        match format {
            OutputFormat::Png => Some(ImageFormat::Png),
            OutputFormat::WebP => Some(ImageFormat::WebP),
            OutputFormat::Tiff => Some(ImageFormat::Tiff),
            OutputFormat::Rgba8 => None,
        }
    }
}
