//! Services separating I/O, codecs and progress reporting from the segmentation core

pub mod codec;
pub mod format;
pub mod io;
pub mod progress;

pub use codec::{ImageCodec, ImageCrateCodec};
pub use format::OutputFormatHandler;
pub use io::ImageIOService;
pub use progress::{
    BatchProcessingStats, ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate,
};
