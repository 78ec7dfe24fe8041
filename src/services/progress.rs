//! Progress reporting service
//!
//! This module separates progress reporting concerns from business logic,
//! allowing different frontends to implement their own progress handling.

use crate::types::{ProcessingTimings, SegmentationStats};
use instant::Instant;
use std::sync::Mutex;

/// Progress stages during background removal processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Reading input bytes
    ImageLoading,
    /// Decoding input into RGBA8 pixels
    Decoding,
    /// Classifying pixels and clearing background alpha
    Segmentation,
    /// Encoding the result into the output format
    Encoding,
    /// Writing the result to disk
    FileSaving,
    /// Processing completed
    Completed,

    // Batch processing stages
    /// Collecting batch inputs
    BatchInitialization,
    /// Processing individual item in batch
    BatchItemProcessing,
    /// Finalizing batch processing
    BatchFinalization,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::Decoding => "Decoding image",
            ProcessingStage::Segmentation => "Classifying pixels",
            ProcessingStage::Encoding => "Encoding output",
            ProcessingStage::FileSaving => "Saving result",
            ProcessingStage::Completed => "Processing completed",
            ProcessingStage::BatchInitialization => "Initializing batch processing",
            ProcessingStage::BatchItemProcessing => "Processing batch item",
            ProcessingStage::BatchFinalization => "Finalizing batch processing",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::ImageLoading => 10,
            ProcessingStage::Decoding => 25,
            ProcessingStage::Segmentation => 60,
            ProcessingStage::Encoding => 85,
            ProcessingStage::FileSaving => 95,
            ProcessingStage::Completed => 100,

            ProcessingStage::BatchInitialization => 5,
            ProcessingStage::BatchItemProcessing => 50, // Variable based on items
            ProcessingStage::BatchFinalization => 98,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self::with_description(stage, stage.description().to_string(), start_time)
    }

    /// Create a progress update with custom description
    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            description,
        }
    }
}

/// Statistics for batch processing operations
#[derive(Debug, Clone, Default)]
pub struct BatchProcessingStats {
    /// Number of items completed (successfully or not)
    pub items_completed: usize,
    /// Total number of items to process
    pub items_total: usize,
    /// Number of items that failed processing
    pub items_failed: usize,
    /// Name of the item that just finished
    pub current_item_name: String,
    /// Processing rate in items per second
    pub processing_rate: f64,
}

impl BatchProcessingStats {
    /// Completed share of the batch, 0-100
    #[must_use]
    pub fn percentage(&self) -> u8 {
        if self.items_total == 0 {
            return 100;
        }
        ((self.items_completed * 100) / self.items_total).min(100) as u8
    }
}

/// Trait for reporting progress during background removal operations
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings and pixel counts
    fn report_completion(&self, timings: &ProcessingTimings, stats: &SegmentationStats);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);

    /// Report batch progress after an item finished
    fn report_batch_progress(&self, stats: &BatchProcessingStats) {
        // Only interactive reporters care about batch progress
        let _ = stats;
    }
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings, _stats: &SegmentationStats) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to show detailed progress information
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings, stats: &SegmentationStats) {
        log::info!(
            "✅ Background removal completed in {}ms ({} of {} pixels removed)",
            timings.total_ms,
            stats.background_pixels,
            stats.total_pixels
        );

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Image decode: {}ms", timings.image_decode_ms);
            log::info!("    • Segmentation: {}ms", timings.segmentation_ms);
            if let Some(encode_ms) = timings.image_encode_ms {
                log::info!("    • Encode: {}ms", encode_ms);
            }
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }

    fn report_batch_progress(&self, stats: &BatchProcessingStats) {
        log::info!(
            "📁 Batch: {}/{} ({}%) {} failed, {:.1} items/sec, last: {}",
            stats.items_completed,
            stats.items_total,
            stats.percentage(),
            stats.items_failed,
            stats.processing_rate,
            stats.current_item_name
        );
    }
}

/// Progress tracker that manages timing and progress reporting
///
/// Shared by reference between concurrent batch items, so stage bookkeeping uses
/// interior mutability.
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Mutex<Option<ProcessingStage>>,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: Mutex::new(None),
        }
    }

    /// Create a progress tracker with no-op reporter (for testing/disabled progress)
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Box::new(NoOpProgressReporter))
    }

    /// Create a progress tracker with console reporter
    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Box::new(ConsoleProgressReporter::new(verbose)))
    }

    fn set_stage(&self, stage: ProcessingStage) {
        if let Ok(mut current) = self.current_stage.lock() {
            *current = Some(stage);
        }
    }

    /// Report progress for a specific stage
    pub fn report_stage(&self, stage: ProcessingStage) {
        self.set_stage(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report progress with custom description
    pub fn report_stage_with_description(&self, stage: ProcessingStage, description: String) {
        self.set_stage(stage);
        self.reporter.report_progress(ProgressUpdate::with_description(
            stage,
            description,
            self.start_time,
        ));
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: &ProcessingTimings, stats: &SegmentationStats) {
        self.set_stage(ProcessingStage::Completed);
        self.reporter.report_completion(timings, stats);
    }

    /// Report an error against the last reported stage
    pub fn report_error(&self, error: &str) {
        let stage = self
            .current_stage()
            .unwrap_or(ProcessingStage::ImageLoading);
        self.reporter.report_error(stage, error);
    }

    /// Forward batch statistics to the reporter
    pub fn report_batch_progress(&self, stats: &BatchProcessingStats) {
        self.reporter.report_batch_progress(stats);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Get the current processing stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage.lock().ok().and_then(|stage| *stage)
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current_stage", &self.current_stage())
            .field("elapsed_ms", &self.elapsed_ms())
            .finish_non_exhaustive()
    }
}
