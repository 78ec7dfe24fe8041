#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # pixel-bgremove
//!
//! Rule-based background removal for RGBA8 pixel buffers.
//!
//! Every pixel is classified independently from its colour and its position. Detection
//! rules (solid background, near white, near dark, edge proximity) mark a pixel as
//! background; protection rules (skin tone, high detail) can veto that decision. Background
//! pixels get alpha 0 and nothing else about the image changes.
//!
//! A single `sensitivity` value in `0..=100` moves every threshold at once: higher values
//! remove more.
//!
//! ## Features
//!
//! - **Deterministic**: same bytes, dimensions and sensitivity always give the same output
//! - **Alpha-only edits**: colour channels are never modified
//! - **Row-parallel**: the pixel pass runs on rayon when the `parallel` feature is enabled
//! - **Format Support**: decode JPEG, PNG, WebP, BMP, TIFF; encode PNG, WebP, TIFF or raw RGBA8
//! - **Batch Processing**: bounded-concurrency processing of many images
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ### Raw buffers
//!
//! ```rust
//! use pixel_bgremove::remove_background_pixels;
//!
//! # fn example() -> pixel_bgremove::Result<()> {
//! let white = vec![255u8; 20 * 20 * 4];
//! let out = remove_background_pixels(&white, 20, 20, 50.0)?;
//! assert!(out.chunks_exact(4).all(|px| px[3] == 0));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ### Encoded images
//!
//! ```rust,no_run
//! use pixel_bgremove::{remove_background_from_reader, OutputFormat, RemovalConfig};
//! use tokio::fs::File;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder()
//!     .sensitivity(65.0)
//!     .output_format(OutputFormat::Png)
//!     .build()?;
//!
//! let file = File::open("input.jpg").await?;
//! let mut result = remove_background_from_reader(file, &config).await?;
//! result.save("output.png", config.output_format)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `parallel` (default): row-parallel segmentation pass with rayon
//! - `cli` (default): Command-line interface and progress reporting (optional for library usage)
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`, `tracing-files`: extra log sinks for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! pixel-bgremove = { version = "0.1", default-features = false, features = ["parallel"] }
//! ```

pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod processor;
pub mod segmentation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use tokio::io::AsyncRead;

// Public API exports
pub use batch::{BatchItem, BatchOutcome, BatchProcessor, BatchSource, BatchSummary};
pub use config::{OutputFormat, RemovalConfig, RemovalConfigBuilder};
pub use error::{BgRemovalError, Result};
pub use processor::BackgroundRemovalProcessor;
pub use segmentation::{
    classify, remove_background_pixels, Classification, PixelContext, PixelFeatures, Rule,
    RuleConstants, RuleKind, SegmentationEngine, Thresholds,
};
pub use services::{
    BatchProcessingStats, ConsoleProgressReporter, ImageCodec, ImageCrateCodec, ImageIOService,
    NoOpProgressReporter, OutputFormatHandler, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
pub use types::{
    PixelBuffer, ProcessingMetadata, ProcessingTimings, RemovalResult, SegmentationStats,
    Sensitivity,
};

#[cfg(feature = "cli")]
pub use tracing_config::{
    events, init_cli_tracing, init_library_tracing, spans, TracingConfig, TracingFormat,
    TracingGuard, TracingOutput,
};

/// Remove background from an image provided as bytes
///
/// Suitable for web servers and other memory-based pipelines. The image is decoded with
/// the `image` crate, converted to RGBA8 and segmented with `config`.
///
/// # Examples
///
/// ```rust,no_run
/// use pixel_bgremove::{remove_background_from_bytes, RemovalConfig};
///
/// # async fn example(upload_bytes: Vec<u8>) -> anyhow::Result<()> {
/// let config = RemovalConfig::default();
/// let result = remove_background_from_bytes(&upload_bytes, &config).await?;
/// let png = result.to_bytes(config.output_format)?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    BackgroundRemovalProcessor::new(config.clone())?.process_bytes(image_bytes)
}

/// Remove background from a `DynamicImage` directly
///
/// # Examples
///
/// ```rust,no_run
/// use pixel_bgremove::{remove_background_from_image, OutputFormat, RemovalConfig};
/// use image::DynamicImage;
///
/// # async fn example(img: DynamicImage) -> anyhow::Result<()> {
/// let config = RemovalConfig::builder().sensitivity(30.0).build()?;
/// let mut result = remove_background_from_image(&img, &config).await?;
/// result.save("output.png", OutputFormat::Png)?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_image(
    image: &image::DynamicImage,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    BackgroundRemovalProcessor::new(config.clone())?.process_image(image)
}

/// Remove background from an async reader stream
///
/// The stream is read to the end before decoding.
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    BackgroundRemovalProcessor::new(config.clone())?
        .process_reader(reader)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encoded(rgba: [u8; 4], width: u32, height: u32) -> Vec<u8> {
        let buffer =
            PixelBuffer::from_raw(width, height, rgba.repeat((width * height) as usize)).unwrap();
        ImageCrateCodec.encode(&buffer, OutputFormat::Png).unwrap()
    }

    #[tokio::test]
    async fn test_bytes_api() {
        let result = remove_background_from_bytes(&encoded([255; 4], 10, 10), &RemovalConfig::default())
            .await
            .unwrap();
        assert_eq!(result.dimensions(), (10, 10));
        assert_eq!(result.stats.background_pixels, 100);
    }

    #[tokio::test]
    async fn test_image_api_keeps_red() {
        let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            8,
            8,
            image::Rgb([255, 0, 0]),
        ));
        let result = remove_background_from_image(&image, &RemovalConfig::default())
            .await
            .unwrap();
        assert_eq!(result.stats.background_pixels, 0);
        assert!(result.buffer.alpha_values().all(|a| a == 255));
    }

    #[tokio::test]
    async fn test_reader_api() {
        let reader = Cursor::new(encoded([255; 4], 4, 4));
        let result = remove_background_from_reader(reader, &RemovalConfig::default())
            .await
            .unwrap();
        assert_eq!(result.stats.total_pixels, 16);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = RemovalConfig {
            sensitivity: 150.0,
            ..RemovalConfig::default()
        };
        let err = remove_background_from_bytes(&encoded([255; 4], 2, 2), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidSensitivity(_)));
    }
}
