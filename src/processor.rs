//! Unified background removal processor
//!
//! `BackgroundRemovalProcessor` drives one image through decode, segmentation and
//! optional encode. It is used by the library convenience functions, the batch
//! runner and the CLI so all of them behave the same way.

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    segmentation::SegmentationEngine,
    services::{ImageCodec, ImageCrateCodec, ImageIOService, ProcessingStage, ProgressTracker},
    types::{PixelBuffer, ProcessingMetadata, ProcessingTimings, RemovalResult},
};
use image::DynamicImage;
use instant::Instant;
use log::debug;
use std::path::Path;
use tracing::{debug as trace_debug, info as trace_info, instrument, span, Level};

/// Background removal processor holding configuration, engine and codec
///
/// All processing methods take `&self`, so one processor can be shared behind an
/// `Arc` by concurrent batch workers.
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    engine: SegmentationEngine,
    codec: Box<dyn ImageCodec>,
    progress_tracker: Option<ProgressTracker>,
}

impl BackgroundRemovalProcessor {
    /// Create a processor using the `image` crate codec
    ///
    /// # Errors
    /// Configuration rejected by [`RemovalConfig::validate`].
    pub fn new(config: RemovalConfig) -> Result<Self> {
        Self::with_codec(config, Box::new(ImageCrateCodec))
    }

    /// Create a processor with a custom codec
    ///
    /// # Errors
    /// Configuration rejected by [`RemovalConfig::validate`].
    pub fn with_codec(config: RemovalConfig, codec: Box<dyn ImageCodec>) -> Result<Self> {
        config.validate()?;

        debug!(
            "Creating processor: sensitivity={}, format={}, parallel={}, codec={}",
            config.sensitivity,
            config.output_format,
            config.parallel,
            codec.name()
        );

        Ok(Self {
            engine: SegmentationEngine::from_config(&config),
            config,
            codec,
            progress_tracker: None,
        })
    }

    /// Attach a progress tracker
    #[must_use]
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = Some(tracker);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    #[must_use]
    pub fn engine(&self) -> &SegmentationEngine {
        &self.engine
    }

    #[must_use]
    pub fn codec(&self) -> &dyn ImageCodec {
        self.codec.as_ref()
    }

    fn report_stage(&self, stage: ProcessingStage) {
        if let Some(tracker) = &self.progress_tracker {
            tracker.report_stage(stage);
        }
    }

    fn report_error(&self, error: &BgRemovalError) {
        if let Some(tracker) = &self.progress_tracker {
            tracker.report_error(&error.to_string());
        }
    }

    /// Segment an already decoded RGBA8 buffer
    ///
    /// # Errors
    /// Currently infallible for a valid buffer; kept fallible for pipeline symmetry.
    #[instrument(
        skip(self, buffer),
        fields(
            dimensions = %format!("{}x{}", buffer.width(), buffer.height()),
            sensitivity = self.config.sensitivity
        )
    )]
    pub fn process_buffer(&self, buffer: PixelBuffer) -> Result<RemovalResult> {
        self.segment_timed(buffer, ProcessingTimings::default(), Instant::now())
    }

    /// Decode and segment encoded image bytes
    ///
    /// # Examples
    /// ```rust,no_run
    /// use pixel_bgremove::{BackgroundRemovalProcessor, RemovalConfig};
    ///
    /// # fn example(image_data: Vec<u8>) -> anyhow::Result<()> {
    /// let processor = BackgroundRemovalProcessor::new(RemovalConfig::default())?;
    /// let result = processor.process_bytes(&image_data)?;
    /// let png = processor.encode(&result)?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Decode failures.
    #[instrument(skip(self, image_bytes), fields(bytes = image_bytes.len()))]
    pub fn process_bytes(&self, image_bytes: &[u8]) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        self.report_stage(ProcessingStage::Decoding);
        let decode_start = Instant::now();
        let buffer = {
            let _span = span!(Level::DEBUG, "decoding", codec = self.codec.name()).entered();
            self.codec.decode(image_bytes).inspect_err(|e| self.report_error(e))?
        };
        timings.image_decode_ms = decode_start.elapsed().as_millis() as u64;

        trace_debug!(
            width = buffer.width(),
            height = buffer.height(),
            decode_ms = timings.image_decode_ms,
            "Image decoded"
        );

        self.segment_timed(buffer, timings, total_start)
    }

    /// Segment an `image` crate image, converting it to RGBA8 first
    ///
    /// # Errors
    /// See [`Self::process_buffer`].
    pub fn process_image(&self, image: &DynamicImage) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        let convert_start = Instant::now();
        let buffer = PixelBuffer::from(image.to_rgba8());
        timings.image_decode_ms = convert_start.elapsed().as_millis() as u64;

        self.segment_timed(buffer, timings, total_start)
    }

    /// Load, decode and segment an image file
    ///
    /// # Errors
    /// File I/O or decode failures.
    #[instrument(skip(self, input_path), fields(input = %input_path.as_ref().display()))]
    pub fn process_file<P: AsRef<Path>>(&self, input_path: P) -> Result<RemovalResult> {
        let input_path_ref = input_path.as_ref();

        self.report_stage(ProcessingStage::ImageLoading);
        let bytes = ImageIOService::read_bytes(input_path_ref).inspect_err(|e| self.report_error(e))?;

        let result = self.process_bytes(&bytes).map_err(|e| match e {
            BgRemovalError::Processing(details) => BgRemovalError::processing_stage_error(
                "image loading",
                &details,
                Some(&input_path_ref.display().to_string()),
            ),
            BgRemovalError::UnsupportedFormat(details) => BgRemovalError::unsupported_format(
                format!("{}: {}", input_path_ref.display(), details),
            ),
            other => other,
        })?;

        Ok(result.with_input_path(input_path_ref.display().to_string()))
    }

    /// Read an async stream to the end, then decode and segment it
    ///
    /// # Examples
    /// ```rust,no_run
    /// use pixel_bgremove::{BackgroundRemovalProcessor, RemovalConfig};
    /// use tokio::fs::File;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let processor = BackgroundRemovalProcessor::new(RemovalConfig::default())?;
    /// let file = File::open("photo.png").await?;
    /// let mut result = processor.process_reader(file).await?;
    /// result.save("photo_bg_removed.png", processor.config().output_format)?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Stream read or decode failures.
    pub async fn process_reader<R: tokio::io::AsyncRead + Unpin>(
        &self,
        mut reader: R,
    ) -> Result<RemovalResult> {
        use tokio::io::AsyncReadExt;

        self.report_stage(ProcessingStage::ImageLoading);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.map_err(|e| {
            BgRemovalError::processing(format!("Failed to read from stream: {}", e))
        })?;

        self.process_bytes(&bytes)
    }

    /// Encode a result in the configured output format with this processor's codec
    ///
    /// # Errors
    /// Encoder failures.
    pub fn encode(&self, result: &RemovalResult) -> Result<Vec<u8>> {
        self.report_stage(ProcessingStage::Encoding);
        let _span = span!(Level::DEBUG, "encoding", format = %self.config.output_format).entered();
        self.codec
            .encode(&result.buffer, self.config.output_format)
            .inspect_err(|e| self.report_error(e))
    }

    /// Encode a result and write it to `path`, recording encode time on the result
    ///
    /// # Errors
    /// Encoder or file system failures.
    pub fn save<P: AsRef<Path>>(&self, result: &mut RemovalResult, path: P) -> Result<()> {
        let encode_start = Instant::now();
        let bytes = self.encode(result)?;

        self.report_stage(ProcessingStage::FileSaving);
        ImageIOService::write_bytes(path.as_ref(), &bytes).inspect_err(|e| self.report_error(e))?;

        let encode_ms = encode_start.elapsed().as_millis() as u64;
        result.metadata.timings.image_encode_ms = Some(encode_ms);
        result.metadata.timings.total_ms += encode_ms;

        if let Some(tracker) = &self.progress_tracker {
            tracker.report_completion(&result.metadata.timings, &result.stats);
        }
        Ok(())
    }

    fn segment_timed(
        &self,
        mut buffer: PixelBuffer,
        mut timings: ProcessingTimings,
        total_start: Instant,
    ) -> Result<RemovalResult> {
        self.report_stage(ProcessingStage::Segmentation);

        let segment_start = Instant::now();
        let stats = self
            .engine
            .segment_in_place(&mut buffer, self.config.sensitivity);
        timings.segmentation_ms = segment_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        trace_info!(
            background_pixels = stats.background_pixels,
            total_pixels = stats.total_pixels,
            segmentation_ms = timings.segmentation_ms,
            "Background pixels cleared"
        );

        let mut metadata = ProcessingMetadata::new(self.config.sensitivity);
        metadata.timings = timings;
        let result = RemovalResult::new(buffer, stats, metadata);

        if self.config.debug {
            debug!(
                "Removed {:.1}% of pixels. {}",
                result.stats.background_ratio() * 100.0,
                result.timing_summary()
            );
        }

        Ok(result)
    }
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("codec", &self.codec.name())
            .field("progress_tracker", &self.progress_tracker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        let buffer =
            PixelBuffer::from_raw(width, height, [255u8; 4].repeat((width * height) as usize))
                .unwrap();
        ImageCrateCodec.encode(&buffer, OutputFormat::Png).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = RemovalConfig {
            sensitivity: 101.0,
            ..RemovalConfig::default()
        };
        assert!(matches!(
            BackgroundRemovalProcessor::new(config),
            Err(BgRemovalError::InvalidSensitivity(_))
        ));
    }

    #[test]
    fn test_process_buffer_removes_white() {
        let processor = BackgroundRemovalProcessor::new(RemovalConfig::default()).unwrap();
        let buffer = PixelBuffer::from_raw(20, 20, [255u8; 4].repeat(400)).unwrap();

        let result = processor.process_buffer(buffer).unwrap();
        assert_eq!(result.stats.background_pixels, 400);
        assert!(result.buffer.alpha_values().all(|a| a == 0));
        assert_eq!(result.metadata.sensitivity, 50.0);
    }

    #[test]
    fn test_process_bytes_and_encode() {
        let processor = BackgroundRemovalProcessor::new(RemovalConfig::default()).unwrap();
        let result = processor.process_bytes(&white_png(8, 8)).unwrap();
        assert_eq!(result.dimensions(), (8, 8));

        let encoded = processor.encode(&result).unwrap();
        let decoded = ImageCrateCodec.decode(&encoded).unwrap();
        assert!(decoded.alpha_values().all(|a| a == 0));
    }

    #[test]
    fn test_process_bytes_rejects_garbage() {
        let processor = BackgroundRemovalProcessor::new(RemovalConfig::default()).unwrap();
        assert!(processor.process_bytes(b"garbage").is_err());
    }

    #[test]
    fn test_process_image() {
        let processor = BackgroundRemovalProcessor::new(RemovalConfig::default()).unwrap();
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            4,
            4,
            image::Rgb([255, 0, 0]),
        ));

        let result = processor.process_image(&image).unwrap();
        assert_eq!(result.stats.background_pixels, 0);
        assert_eq!(result.buffer.pixel(0, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_process_file_records_input_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("white.png");
        std::fs::write(&path, white_png(5, 5)).unwrap();

        let processor = BackgroundRemovalProcessor::new(RemovalConfig::default()).unwrap();
        let mut result = processor.process_file(&path).unwrap();
        assert!(result.input_path.as_deref().unwrap().ends_with("white.png"));

        let out = temp_dir.path().join("out/white_bg_removed.png");
        processor.save(&mut result, &out).unwrap();
        assert!(out.exists());
        assert!(result.timings().image_encode_ms.is_some());
    }

    #[test]
    fn test_process_file_missing() {
        let processor = BackgroundRemovalProcessor::new(RemovalConfig::default()).unwrap();
        assert!(matches!(
            processor.process_file("/nonexistent/file.png"),
            Err(BgRemovalError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_process_reader() {
        let processor = BackgroundRemovalProcessor::new(RemovalConfig::default()).unwrap();
        let bytes = white_png(3, 3);
        let result = processor.process_reader(bytes.as_slice()).await.unwrap();
        assert_eq!(result.stats.background_pixels, 9);
    }

    struct CountingCodec {
        decodes: Arc<AtomicUsize>,
    }

    impl ImageCodec for CountingCodec {
        fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            // Treat the input as raw 2x2 RGBA
            PixelBuffer::from_raw(2, 2, bytes.to_vec())
        }

        fn encode(&self, buffer: &PixelBuffer, _format: OutputFormat) -> Result<Vec<u8>> {
            Ok(buffer.as_bytes().to_vec())
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn test_custom_codec() {
        let decodes = Arc::new(AtomicUsize::new(0));
        let processor = BackgroundRemovalProcessor::with_codec(
            RemovalConfig::default(),
            Box::new(CountingCodec {
                decodes: Arc::clone(&decodes),
            }),
        )
        .unwrap();

        let result = processor.process_bytes(&[255u8; 16]).unwrap();
        assert_eq!(decodes.load(Ordering::SeqCst), 1);
        assert_eq!(processor.codec().name(), "counting");
        assert_eq!(processor.encode(&result).unwrap(), [255, 255, 255, 0].repeat(4));

        assert!(matches!(
            processor.process_bytes(&[0u8; 15]),
            Err(BgRemovalError::InvalidBufferShape { .. })
        ));
    }

    #[test]
    fn test_progress_tracker_attached() {
        let processor = BackgroundRemovalProcessor::new(RemovalConfig::default())
            .unwrap()
            .with_progress_tracker(ProgressTracker::no_op());
        let result = processor.process_bytes(&white_png(2, 2)).unwrap();
        assert_eq!(result.stats.total_pixels, 4);
    }
}
