//! Concurrent processing of many images
//!
//! Each image runs on tokio's blocking pool through a shared
//! [`BackgroundRemovalProcessor`]; at most `concurrency` images are in flight.
//! Items with an output path are encoded and written by the same worker, so
//! encoding runs inside the concurrency limit.
//! Outcomes arrive in completion order and carry the submission index, so callers
//! can restore input order with [`BatchOutcome::sort_by_input_order`].

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    processor::BackgroundRemovalProcessor,
    services::{BatchProcessingStats, ProcessingStage, ProgressTracker},
    types::{RemovalResult, SegmentationStats},
};
use futures::stream::{self, StreamExt};
use instant::Instant;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, instrument, warn};

/// Where a batch item's encoded image comes from
#[derive(Debug, Clone)]
pub enum BatchSource {
    /// Encoded image already in memory
    Bytes(Vec<u8>),
    /// Image file on disk
    Path(PathBuf),
}

/// One image submitted to a batch
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Position in the submitted list
    pub index: usize,
    /// Display name used in logs and outcomes
    pub name: String,
    pub source: BatchSource,
    /// Where the worker writes the encoded result, if anywhere
    pub output: Option<PathBuf>,
}

impl BatchItem {
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(index: usize, path: P) -> Self {
        let path = path.as_ref();
        Self {
            index,
            name: path.display().to_string(),
            source: BatchSource::Path(path.to_path_buf()),
            output: None,
        }
    }

    #[must_use]
    pub fn from_bytes<S: Into<String>>(index: usize, name: S, bytes: Vec<u8>) -> Self {
        Self {
            index,
            name: name.into(),
            source: BatchSource::Bytes(bytes),
            output: None,
        }
    }

    /// Encode the result in the configured format and write it to `path`
    #[must_use]
    pub fn with_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Items for a list of paths, indexed in list order
    #[must_use]
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Vec<Self> {
        paths
            .iter()
            .enumerate()
            .map(|(index, path)| Self::from_path(index, path))
            .collect()
    }
}

/// Result of one batch item
#[derive(Debug)]
pub struct BatchOutcome {
    pub index: usize,
    pub name: String,
    /// Written file, when the item had an output and saving succeeded
    pub output: Option<PathBuf>,
    pub result: Result<RemovalResult>,
}

impl BatchOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Restore submission order after concurrent completion
    pub fn sort_by_input_order(outcomes: &mut [BatchOutcome]) {
        outcomes.sort_by_key(|outcome| outcome.index);
    }
}

/// Aggregate counters over a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Pixel counters summed over all successful items
    pub pixels: SegmentationStats,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    #[must_use]
    pub fn from_outcomes(outcomes: &[BatchOutcome], elapsed_ms: u64) -> Self {
        let mut summary = Self {
            elapsed_ms,
            ..Self::default()
        };
        for outcome in outcomes {
            summary.record(outcome);
        }
        summary
    }

    /// Count one finished item
    pub fn record(&mut self, outcome: &BatchOutcome) {
        self.total += 1;
        match &outcome.result {
            Ok(result) => {
                self.succeeded += 1;
                self.pixels = self.pixels.merge(result.stats);
            },
            Err(_) => self.failed += 1,
        }
    }

    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} succeeded, {} failed, {} of {} pixels removed in {}ms",
            self.succeeded,
            self.total,
            self.failed,
            self.pixels.background_pixels,
            self.pixels.total_pixels,
            self.elapsed_ms
        )
    }
}

/// Runs many images through one shared processor with bounded concurrency
pub struct BatchProcessor {
    processor: Arc<BackgroundRemovalProcessor>,
    concurrency: usize,
    progress_tracker: Option<ProgressTracker>,
}

impl BatchProcessor {
    /// Batch processor over a fresh processor for `config`
    ///
    /// # Errors
    /// Configuration rejected by [`RemovalConfig::validate`].
    pub fn new(config: RemovalConfig) -> Result<Self> {
        Ok(Self::from_processor(Arc::new(BackgroundRemovalProcessor::new(
            config,
        )?)))
    }

    /// Batch processor sharing an existing processor
    #[must_use]
    pub fn from_processor(processor: Arc<BackgroundRemovalProcessor>) -> Self {
        let concurrency = processor.config().effective_concurrency();
        Self {
            processor,
            concurrency,
            progress_tracker: None,
        }
    }

    /// Override the concurrency limit (minimum 1)
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Attach a tracker receiving batch-level progress
    #[must_use]
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = Some(tracker);
        self
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn processor(&self) -> &Arc<BackgroundRemovalProcessor> {
        &self.processor
    }

    /// Process every item, returning outcomes in completion order
    ///
    /// Every outcome keeps its full result, pixel buffer included. For large batches
    /// prefer [`Self::process_all_with`] and per-item outputs.
    pub async fn process_all(&self, items: Vec<BatchItem>) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        self.process_all_with(items, |outcome| outcomes.push(outcome))
            .await;
        outcomes
    }

    /// Process every item, handing each outcome to `on_complete` as it finishes
    ///
    /// Outcomes are moved into the callback, so a result is dropped as soon as the
    /// callback is done with it. One item's failure is recorded in its outcome and
    /// never affects the others.
    #[instrument(skip_all, fields(items = items.len(), concurrency = self.concurrency))]
    pub async fn process_all_with<F>(&self, items: Vec<BatchItem>, mut on_complete: F) -> BatchSummary
    where
        F: FnMut(BatchOutcome),
    {
        let start = Instant::now();
        let total = items.len();

        if let Some(tracker) = &self.progress_tracker {
            tracker.report_stage_with_description(
                ProcessingStage::BatchInitialization,
                format!("Processing {} images, {} at a time", total, self.concurrency),
            );
        }

        let mut pending = stream::iter(items.into_iter().map(|item| {
            if let Some(tracker) = &self.progress_tracker {
                tracker.report_stage_with_description(
                    ProcessingStage::BatchItemProcessing,
                    format!("Starting {}", item.name),
                );
            }
            run_item(Arc::clone(&self.processor), item)
        }))
        .buffer_unordered(self.concurrency);

        let mut summary = BatchSummary::default();
        let mut stats = BatchProcessingStats {
            items_total: total,
            ..BatchProcessingStats::default()
        };

        while let Some(outcome) = pending.next().await {
            summary.record(&outcome);
            stats.items_completed += 1;
            stats.current_item_name.clone_from(&outcome.name);
            if let Err(e) = &outcome.result {
                stats.items_failed += 1;
                warn!(item = %outcome.name, error = %e, "Batch item failed");
            }

            let elapsed_secs = start.elapsed().as_secs_f64();
            if elapsed_secs > 0.0 {
                stats.processing_rate = stats.items_completed as f64 / elapsed_secs;
            }

            if let Some(tracker) = &self.progress_tracker {
                tracker.report_batch_progress(&stats);
            }

            on_complete(outcome);
        }

        if let Some(tracker) = &self.progress_tracker {
            tracker.report_stage(ProcessingStage::BatchFinalization);
        }

        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            completed = stats.items_completed,
            failed = stats.items_failed,
            elapsed_ms = summary.elapsed_ms,
            "Batch finished"
        );
        summary
    }
}

async fn run_item(processor: Arc<BackgroundRemovalProcessor>, item: BatchItem) -> BatchOutcome {
    let BatchItem {
        index,
        name,
        source,
        output,
    } = item;
    let result_name = name.clone();
    let output_path = output.clone();

    let joined = tokio::task::spawn_blocking(move || -> Result<RemovalResult> {
        let mut result = match source {
            BatchSource::Bytes(bytes) => processor
                .process_bytes(&bytes)
                .map(|result| result.with_input_path(result_name))?,
            BatchSource::Path(path) => processor.process_file(&path)?,
        };
        if let Some(path) = &output_path {
            processor.save(&mut result, path)?;
        }
        Ok(result)
    })
    .await;

    let result = joined.unwrap_or_else(|e| {
        Err(BgRemovalError::internal(format!(
            "Batch worker for '{}' did not complete: {}",
            name, e
        )))
    });

    BatchOutcome {
        index,
        name,
        output: output.filter(|_| result.is_ok()),
        result,
    }
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("processor", &self.processor)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
