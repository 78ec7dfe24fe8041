//! Rule-based background segmentation
//!
//! The engine walks an RGBA8 buffer once, classifies every pixel independently and
//! writes alpha 0 to the pixels classified as background. Color channels and the
//! alpha of kept pixels are never touched.
//!
//! Each pixel only depends on its own value and coordinates, so rows are processed
//! in parallel when the `parallel` feature is enabled. Output is identical either way.

pub mod rules;

pub use rules::{
    classify, Classification, PixelContext, PixelFeatures, Rule, RuleConstants, RuleKind,
    Thresholds,
};

use crate::{
    config::RemovalConfig,
    error::Result,
    types::{PixelBuffer, SegmentationStats, CHANNELS},
};
use tracing::{debug, span, Level};

/// Pixel classification engine
///
/// Stateless between calls; a single engine can be shared across threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationEngine {
    constants: RuleConstants,
    parallel: bool,
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self {
            constants: RuleConstants::default(),
            parallel: true,
        }
    }
}

impl SegmentationEngine {
    #[must_use]
    pub fn new(constants: RuleConstants) -> Self {
        Self {
            constants,
            ..Self::default()
        }
    }

    /// Engine using the rule constants and parallelism setting of a config
    #[must_use]
    pub fn from_config(config: &RemovalConfig) -> Self {
        Self {
            constants: config.rules,
            parallel: config.parallel,
        }
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn constants(&self) -> &RuleConstants {
        &self.constants
    }

    /// Whether passes actually run on the rayon pool
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.parallel && cfg!(feature = "parallel")
    }

    /// Classify a single pixel without touching any buffer
    #[must_use]
    pub fn classify(
        &self,
        rgb: [u8; 3],
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        thresholds: &Thresholds,
    ) -> Classification {
        classify(
            &PixelContext::new(rgb, x, y, width, height),
            thresholds,
            &self.constants,
        )
    }

    /// Segment a raw RGBA8 slice into a new buffer
    ///
    /// # Errors
    /// `BgRemovalError::InvalidBufferShape` when `rgba.len() != width * height * 4`.
    pub fn segment(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        sensitivity: f32,
    ) -> Result<Vec<u8>> {
        let mut buffer = PixelBuffer::from_raw(width, height, rgba.to_vec())?;
        self.segment_in_place(&mut buffer, sensitivity);
        Ok(buffer.into_raw())
    }

    /// Segment a copy of `buffer`, leaving the input untouched
    #[must_use]
    pub fn segment_buffer(
        &self,
        buffer: &PixelBuffer,
        sensitivity: f32,
    ) -> (PixelBuffer, SegmentationStats) {
        let mut output = buffer.clone();
        let stats = self.segment_in_place(&mut output, sensitivity);
        (output, stats)
    }

    /// Segment `buffer` in place
    ///
    /// Sensitivity is used as given; values outside 0-100 extrapolate the
    /// threshold formulas.
    pub fn segment_in_place(&self, buffer: &mut PixelBuffer, sensitivity: f32) -> SegmentationStats {
        let (width, height) = buffer.dimensions();
        let thresholds = Thresholds::from_sensitivity(sensitivity);

        let pass_span = span!(
            Level::DEBUG,
            "segmentation_pass",
            width,
            height,
            sensitivity,
            parallel = self.is_parallel()
        );
        let _guard = pass_span.enter();

        let background_pixels = self.run_pass(buffer.as_bytes_mut(), width, height, &thresholds);
        let stats = SegmentationStats {
            total_pixels: buffer.pixel_count(),
            background_pixels,
        };

        debug!(
            total_pixels = stats.total_pixels,
            background_pixels = stats.background_pixels,
            "Segmentation pass completed"
        );
        stats
    }

    fn run_pass(&self, data: &mut [u8], width: u32, height: u32, thresholds: &Thresholds) -> usize {
        let row_len = width as usize * CHANNELS;
        if row_len == 0 || height == 0 {
            return 0;
        }

        #[cfg(feature = "parallel")]
        {
            if self.parallel {
                use rayon::prelude::*;

                return data
                    .par_chunks_mut(row_len)
                    .enumerate()
                    .map(|(y, row)| self.process_row(row, y as u32, width, height, thresholds))
                    .sum();
            }
        }

        data.chunks_mut(row_len)
            .enumerate()
            .map(|(y, row)| self.process_row(row, y as u32, width, height, thresholds))
            .sum()
    }

    fn process_row(
        &self,
        row: &mut [u8],
        y: u32,
        width: u32,
        height: u32,
        thresholds: &Thresholds,
    ) -> usize {
        let mut removed = 0;
        for (x, px) in row.chunks_exact_mut(CHANNELS).enumerate() {
            if let [r, g, b, alpha] = px {
                let verdict = self.classify([*r, *g, *b], x as u32, y, width, height, thresholds);
                if verdict.is_background {
                    *alpha = 0;
                    removed += 1;
                }
            }
        }
        removed
    }
}

/// Remove background pixels from a raw RGBA8 buffer with default rule constants
///
/// # Errors
/// `BgRemovalError::InvalidBufferShape` when the length does not match the dimensions.
pub fn remove_background_pixels(
    rgba: &[u8],
    width: u32,
    height: u32,
    sensitivity: f32,
) -> Result<Vec<u8>> {
    SegmentationEngine::default().segment(rgba, width, height, sensitivity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BgRemovalError;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        rgba.repeat((width * height) as usize)
    }

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[
                    (x * 255 / width.max(1)) as u8,
                    (y * 255 / height.max(1)) as u8,
                    ((x + y) % 256) as u8,
                    255,
                ]);
            }
        }
        data
    }

    #[test]
    fn test_white_image_fully_removed() {
        let input = solid(20, 20, [255, 255, 255, 255]);
        let output = remove_background_pixels(&input, 20, 20, 50.0).unwrap();

        assert_eq!(output.len(), 1600);
        for px in output.chunks_exact(4) {
            assert_eq!(px, &[255, 255, 255, 0]);
        }
    }

    #[test]
    fn test_mid_gray_kept_at_zero_sensitivity() {
        let input = solid(20, 20, [128, 128, 128, 255]);
        let output = remove_background_pixels(&input, 20, 20, 0.0).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = remove_background_pixels(&[0; 99], 5, 5, 50.0).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidBufferShape { .. }));
    }

    #[test]
    fn test_empty_image() {
        assert!(remove_background_pixels(&[], 0, 0, 50.0).unwrap().is_empty());
        assert!(remove_background_pixels(&[], 7, 0, 50.0).unwrap().is_empty());
        assert!(remove_background_pixels(&[], 0, 7, 50.0).unwrap().is_empty());
    }

    #[test]
    fn test_only_alpha_changes() {
        let input = gradient(32, 24);
        let output = remove_background_pixels(&input, 32, 24, 100.0).unwrap();

        for (before, after) in input.chunks_exact(4).zip(output.chunks_exact(4)) {
            assert_eq!(before[..3], after[..3]);
            assert!(after[3] == before[3] || after[3] == 0);
        }
    }

    #[test]
    fn test_existing_alpha_preserved_for_kept_pixels() {
        let input = solid(4, 4, [255, 0, 0, 77]);
        let output = remove_background_pixels(&input, 4, 4, 100.0).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let input = gradient(64, 48);
        let width = 64;
        let height = 48;

        for sensitivity in [0.0, 35.0, 100.0] {
            let parallel = SegmentationEngine::default()
                .with_parallel(true)
                .segment(&input, width, height, sensitivity)
                .unwrap();
            let sequential = SegmentationEngine::default()
                .with_parallel(false)
                .segment(&input, width, height, sensitivity)
                .unwrap();
            assert_eq!(parallel, sequential);
        }
    }

    #[test]
    fn test_stats_count_removed_pixels() {
        let mut data = solid(20, 20, [128, 128, 128, 255]);
        // One white pixel in the interior
        let idx = (10 * 20 + 10) * 4;
        data[idx..idx + 4].copy_from_slice(&[255, 255, 255, 255]);

        let mut buffer = PixelBuffer::from_raw(20, 20, data).unwrap();
        let stats = SegmentationEngine::default().segment_in_place(&mut buffer, 0.0);

        assert_eq!(stats.total_pixels, 400);
        assert_eq!(stats.background_pixels, 1);
        assert_eq!(buffer.pixel(10, 10), Some([255, 255, 255, 0]));
        assert_eq!(buffer.pixel(0, 0), Some([128, 128, 128, 255]));
    }

    #[test]
    fn test_segment_buffer_leaves_input_untouched() {
        let buffer = PixelBuffer::from_raw(3, 3, solid(3, 3, [250, 250, 250, 255])).unwrap();
        let (output, stats) = SegmentationEngine::default().segment_buffer(&buffer, 50.0);

        assert!(buffer.alpha_values().all(|a| a == 255));
        assert!(output.alpha_values().all(|a| a == 0));
        assert_eq!(stats.background_pixels, 9);
    }

    #[test]
    fn test_nan_sensitivity_keeps_everything() {
        let input = solid(12, 12, [255, 255, 255, 255]);
        let output = remove_background_pixels(&input, 12, 12, f32::NAN).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_custom_constants_change_outcome() {
        // Light, slightly tinted pixel: detected as solid background at s=100,
        // protected once the high-detail limit drops below its variance.
        let input = solid(12, 12, [230, 200, 200, 255]);

        let default_out = SegmentationEngine::default()
            .segment(&input, 12, 12, 100.0)
            .unwrap();
        assert!(default_out.chunks_exact(4).all(|px| px[3] == 0));

        let strict = SegmentationEngine::new(RuleConstants {
            high_detail_variance: 10.0,
            ..RuleConstants::default()
        });
        let strict_out = strict.segment(&input, 12, 12, 100.0).unwrap();
        assert_eq!(strict_out, input);
    }

    #[test]
    fn test_engine_classify_reports_rules() {
        let engine = SegmentationEngine::default();
        let thresholds = Thresholds::from_sensitivity(50.0);

        let white = engine.classify([255, 255, 255], 5, 5, 20, 20, &thresholds);
        assert!(white.is_background);
        assert_eq!(white.detected_by, Some(Rule::SolidBackground));

        let skin = engine.classify([200, 150, 120], 5, 5, 20, 20, &thresholds);
        assert!(!skin.is_background);
    }
}
