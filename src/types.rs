//! Core types for background removal operations

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    services::{ImageCodec, ImageCrateCodec, ImageIOService},
};
use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bytes per RGBA8 pixel
pub const CHANNELS: usize = 4;

/// Flat RGBA8 pixel buffer
///
/// Row-major, top-left origin, non-premultiplied alpha, no row padding. The length
/// is always exactly `width * height * 4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA8 bytes, validating the length against the dimensions
    ///
    /// # Errors
    /// `BgRemovalError::InvalidBufferShape` when the length is not a multiple of 4
    /// or differs from `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let actual = data.len();
        let expected = Self::expected_len(width, height)
            .ok_or_else(|| BgRemovalError::invalid_buffer_shape(width, height, usize::MAX, actual))?;

        if actual % CHANNELS != 0 || actual != expected {
            return Err(BgRemovalError::invalid_buffer_shape(
                width, height, expected, actual,
            ));
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Fully transparent buffer of the given size
    ///
    /// # Errors
    /// `BgRemovalError::InvalidBufferShape` when the byte length overflows `usize`.
    pub fn transparent(width: u32, height: u32) -> Result<Self> {
        let len = Self::expected_len(width, height)
            .ok_or_else(|| BgRemovalError::invalid_buffer_shape(width, height, usize::MAX, 0))?;
        Self::from_raw(width, height, vec![0; len])
    }

    /// Byte length of an RGBA8 buffer, or `None` on overflow
    #[must_use]
    pub fn expected_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(CHANNELS))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.data.len() / CHANNELS
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// RGBA value at `(x, y)`, if inside the buffer
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * CHANNELS;
        match self.data.get(start..start + CHANNELS) {
            Some(&[r, g, b, a]) => Some([r, g, b, a]),
            _ => None,
        }
    }

    /// Iterate over the alpha channel
    pub fn alpha_values(&self) -> impl Iterator<Item = u8> + '_ {
        self.data.chunks_exact(CHANNELS).filter_map(|px| px.last().copied())
    }

    /// Convert into an `image` crate buffer
    ///
    /// # Errors
    /// Never fails for a buffer built through `from_raw`; kept fallible to mirror
    /// `ImageBuffer::from_raw`.
    pub fn into_rgba_image(self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data)
            .ok_or_else(|| BgRemovalError::internal("Pixel buffer does not match its dimensions"))
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

/// Caller-facing aggressiveness dial
///
/// Higher values remove more pixels. The engine itself accepts any `f32` and
/// extrapolates; this type is the validated boundary.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Sensitivity(f32);

impl Sensitivity {
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 100.0;
    pub const DEFAULT: f32 = 50.0;

    /// Validated sensitivity
    ///
    /// # Errors
    /// `BgRemovalError::InvalidSensitivity` for non-finite or out-of-range values.
    pub fn new(value: f32) -> Result<Self> {
        if value.is_finite() && (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(BgRemovalError::InvalidSensitivity(value))
        }
    }

    /// Sensitivity clamped into 0-100; NaN maps to the default
    #[must_use]
    pub fn clamped(value: f32) -> Self {
        if value.is_nan() {
            Self(Self::DEFAULT)
        } else {
            Self(value.clamp(Self::MIN, Self::MAX))
        }
    }

    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters produced by one segmentation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationStats {
    pub total_pixels: usize,
    /// Pixels classified as background (alpha written to 0)
    pub background_pixels: usize,
}

impl SegmentationStats {
    #[must_use]
    pub fn foreground_pixels(&self) -> usize {
        self.total_pixels.saturating_sub(self.background_pixels)
    }

    #[must_use]
    pub fn background_ratio(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            self.background_pixels as f64 / self.total_pixels as f64
        }
    }

    /// Combine counters from several passes
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            total_pixels: self.total_pixels.saturating_add(other.total_pixels),
            background_pixels: self.background_pixels.saturating_add(other.background_pixels),
        }
    }
}

/// Detailed timing breakdown for background removal processing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Image decoding into RGBA8
    pub image_decode_ms: u64,

    /// Pixel classification pass
    pub segmentation_ms: u64,

    /// Final image encoding (if saving or serialising)
    pub image_encode_ms: Option<u64>,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

/// Percentage of total time spent in each stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingBreakdown {
    pub decode_pct: f64,
    pub segmentation_pct: f64,
    pub encode_pct: f64,
    pub other_pct: f64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn breakdown_percentages(&self) -> TimingBreakdown {
        if self.total_ms == 0 {
            return TimingBreakdown::default();
        }

        let total = self.total_ms as f64;
        TimingBreakdown {
            decode_pct: (self.image_decode_ms as f64 / total) * 100.0,
            segmentation_pct: (self.segmentation_ms as f64 / total) * 100.0,
            encode_pct: (self.image_encode_ms.unwrap_or(0) as f64 / total) * 100.0,
            other_pct: (self.other_overhead_ms() as f64 / total) * 100.0,
        }
    }

    /// Time not attributed to any measured stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured =
            self.image_decode_ms + self.segmentation_ms + self.image_encode_ms.unwrap_or(0);
        self.total_ms.saturating_sub(measured)
    }
}

/// Metadata attached to every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Sensitivity the pass ran with
    pub sensitivity: f32,
    pub timings: ProcessingTimings,
    pub processed_at: DateTime<Utc>,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(sensitivity: f32) -> Self {
        Self {
            sensitivity,
            timings: ProcessingTimings::default(),
            processed_at: Utc::now(),
        }
    }
}

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Output pixels, alpha-modified
    pub buffer: PixelBuffer,

    pub stats: SegmentationStats,

    pub metadata: ProcessingMetadata,

    /// Original input path (for logging purposes)
    pub input_path: Option<String>,
}

impl RemovalResult {
    #[must_use]
    pub fn new(buffer: PixelBuffer, stats: SegmentationStats, metadata: ProcessingMetadata) -> Self {
        Self {
            buffer,
            stats,
            metadata,
            input_path: None,
        }
    }

    #[must_use]
    pub fn with_input_path<S: Into<String>>(mut self, input_path: S) -> Self {
        self.input_path = Some(input_path.into());
        self
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.metadata.timings
    }

    /// Get the image as raw RGBA bytes
    #[must_use]
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.buffer.as_bytes().to_vec()
    }

    /// Encode with the default `image`-backed codec
    ///
    /// # Errors
    /// Propagates encoder failures.
    pub fn to_bytes(&self, format: OutputFormat) -> Result<Vec<u8>> {
        ImageCrateCodec.encode(&self.buffer, format)
    }

    /// Encode and write to `path`, recording the encode time
    ///
    /// # Errors
    /// Encoder or file system failures.
    pub fn save<P: AsRef<Path>>(&mut self, path: P, format: OutputFormat) -> Result<()> {
        let encode_start = instant::Instant::now();
        let bytes = self.to_bytes(format)?;
        ImageIOService::write_bytes(path.as_ref(), &bytes)?;

        let encode_ms = encode_start.elapsed().as_millis() as u64;
        self.metadata.timings.image_encode_ms = Some(encode_ms);
        self.metadata.timings.total_ms += encode_ms;

        tracing::debug!(
            output = %path.as_ref().display(),
            encode_ms,
            "Result saved"
        );
        Ok(())
    }

    /// Get timing summary for display
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.metadata.timings;
        let breakdown = t.breakdown_percentages();

        let mut summary = format!(
            "Total: {}ms | Decode: {}ms ({:.1}%) | Segmentation: {}ms ({:.1}%)",
            t.total_ms,
            t.image_decode_ms,
            breakdown.decode_pct,
            t.segmentation_ms,
            breakdown.segmentation_pct
        );

        if let Some(encode_ms) = t.image_encode_ms {
            summary.push_str(&format!(
                " | Encode: {}ms ({:.1}%)",
                encode_ms, breakdown.encode_pct
            ));
        }

        let other_ms = t.other_overhead_ms();
        if other_ms > 5 || breakdown.other_pct > 1.0 {
            summary.push_str(&format!(
                " | Other: {}ms ({:.1}%)",
                other_ms, breakdown.other_pct
            ));
        }

        summary
    }
}
