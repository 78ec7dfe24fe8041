//! Background Removal CLI Tool
//!
//! Command-line interface for clearing backgrounds from images with the rule-based engine.

use super::config::CliConfigBuilder;
use crate::{
    batch::{BatchItem, BatchProcessor, BatchSummary},
    config::OutputFormat,
    processor::BackgroundRemovalProcessor,
    services::{ImageIOService, OutputFormatHandler, ProgressTracker},
    tracing_config::{events, init_cli_tracing, spans},
    types::RemovalResult,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Input extensions picked up from directories
const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];

/// Rule-based background removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "pixel-bgremove")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<String>,

    /// Output file (single input) or directory (batch processing). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Output format [default: png]
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// Removal sensitivity, 0-100; higher removes more [default: 50]
    #[arg(short, long, allow_negative_numbers = true)]
    pub sensitivity: Option<f32>,

    /// Images processed at once in batch mode (0 = number of CPUs)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Process directory recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for batch processing (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// JSON configuration file; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Classify pixels on a single thread
    #[arg(long)]
    pub no_parallel: bool,

    /// Report per-stage and per-item progress in the log instead of a progress bar
    #[arg(long)]
    pub progress: bool,

    /// Log line format on stderr or in the log file
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Webp,
    Tiff,
    Rgba8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    /// Colored human-readable lines
    Console,
    /// Plain lines without colors
    Compact,
    /// One JSON object per event (`tracing-json` builds)
    Json,
}

/// Where a single result is written
#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    fn parse(target: &str) -> Self {
        if target == "-" {
            Self::Stdout
        } else {
            Self::File(PathBuf::from(target))
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = uuid::Uuid::new_v4().to_string();
    let tracing_config = CliConfigBuilder::tracing_config(&cli, &session_id)?;
    let _tracing_guard = init_cli_tracing(tracing_config).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    info!("Starting background removal CLI");
    info!("Input(s): {}", cli.input.join(", "));
    info!(
        "Sensitivity: {}, format: {}, parallel: {}",
        config.sensitivity, config.output_format, config.parallel
    );

    let session_span = spans::session(&session_id, config.sensitivity);
    let _session = session_span.enter();

    let mut processor = BackgroundRemovalProcessor::new(config)
        .context("Failed to create background removal processor")?;
    if cli.progress {
        processor = processor.with_progress_tracker(ProgressTracker::console(cli.verbose > 0));
    }
    let processor = Arc::new(processor);

    let start_time = Instant::now();
    let summary = process_inputs(&cli, processor).await?;

    info!(
        "Processed {} image(s) in {:.2}s",
        summary.succeeded,
        start_time.elapsed().as_secs_f64()
    );

    if summary.failed > 0 {
        anyhow::bail!(
            "{} of {} image(s) failed to process",
            summary.failed,
            summary.total
        );
    }

    Ok(())
}

async fn process_inputs(cli: &Cli, processor: Arc<BackgroundRemovalProcessor>) -> Result<BatchSummary> {
    // Handle stdin specially (single input)
    if cli.input.len() == 1 && cli.input.first().is_some_and(|s| s == "-") {
        return process_stdin(cli.output.as_deref(), &processor).await;
    }

    let all_files = collect_input_files(cli)?;

    if all_files.is_empty() {
        events::warning_with_recommendation(
            "No supported image files found in the provided inputs",
            "pass --recursive for nested directories or loosen --pattern",
        );
        return Ok(BatchSummary::default());
    }

    info!("Found {} image file(s) to process", all_files.len());

    if let [InputFile { path: single, .. }] = all_files.as_slice() {
        let target = match cli.output.as_deref() {
            Some(target) => OutputTarget::parse(target),
            None => OutputTarget::File(generate_output_path(
                single,
                processor.config().output_format,
            )),
        };

        let start = Instant::now();
        let outcome = process_single_file(&processor, single, &target);
        if let Err(e) = &outcome {
            error!("❌ Failed to process {}: {:#}", single.display(), e);
        }

        return Ok(BatchSummary {
            total: 1,
            succeeded: usize::from(outcome.is_ok()),
            failed: usize::from(outcome.is_err()),
            elapsed_ms: start.elapsed().as_millis() as u64,
            ..BatchSummary::default()
        });
    }

    process_batch(cli, processor, &all_files).await
}

/// An image to process and the directory input it was found under
#[derive(Debug, Clone, PartialEq, Eq)]
struct InputFile {
    path: PathBuf,
    /// `None` for files named directly on the command line
    root: Option<PathBuf>,
}

impl InputFile {
    /// Directory of the file relative to its input directory
    fn relative_dir(&self) -> &Path {
        self.root
            .as_deref()
            .zip(self.path.parent())
            .and_then(|(root, parent)| parent.strip_prefix(root).ok())
            .unwrap_or(Path::new(""))
    }
}

/// Collect, filter and sort every image named by the inputs
fn collect_input_files(cli: &Cli) -> Result<Vec<InputFile>> {
    let mut all_files = Vec::new();

    for input in &cli.input {
        let path = PathBuf::from(input);

        if path.is_file() {
            if is_image_file(&path, &IMAGE_EXTENSIONS) {
                all_files.push(InputFile { path, root: None });
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            let found = find_image_files(&path, cli.recursive, cli.pattern.as_deref())?;
            all_files.extend(found.into_iter().map(|file| InputFile {
                path: file,
                root: Some(path.clone()),
            }));
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    // Sort files alphanumerically for consistent processing order
    all_files.sort_by(|a, b| a.path.cmp(&b.path));
    all_files.dedup_by(|a, b| a.path == b.path);
    Ok(all_files)
}

/// Pick one output path per input, in input order
///
/// Files found under a directory input keep their sub-directory below `output_dir`.
/// When two inputs would still land on the same path (same stem in one flat
/// directory, or an output that is itself an input) the later ones get the
/// source extension and then a counter added to the name.
fn plan_output_paths(files: &[InputFile], output_dir: Option<&Path>, format: OutputFormat) -> Vec<PathBuf> {
    let natural: Vec<PathBuf> = files
        .iter()
        .map(|file| match output_dir {
            Some(dir) => dir
                .join(file.relative_dir())
                .join(output_file_name(&file.path, format)),
            None => generate_output_path(&file.path, format),
        })
        .collect();

    let inputs: HashSet<&Path> = files.iter().map(|file| file.path.as_path()).collect();
    let mut claims: HashMap<&Path, usize> = HashMap::new();
    for path in &natural {
        *claims.entry(path.as_path()).or_default() += 1;
    }
    let contested =
        |path: &Path| inputs.contains(path) || claims.get(path).copied().unwrap_or(0) > 1;

    let mut taken: HashSet<PathBuf> = natural
        .iter()
        .filter(|path| !contested(path.as_path()))
        .cloned()
        .collect();

    files
        .iter()
        .zip(&natural)
        .map(|(file, path)| {
            // First claimant keeps the plain name unless it would overwrite an input
            if !contested(path.as_path())
                || (!inputs.contains(path.as_path()) && taken.insert(path.clone()))
            {
                return path.clone();
            }

            let dir = path.parent().unwrap_or(Path::new(""));
            let stem = file.path.file_stem().unwrap_or_default().to_string_lossy();
            let source_ext = file
                .path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let ext = OutputFormatHandler::get_extension(format);

            let unique = (1..)
                .map(|n| {
                    let suffix = if n == 1 { String::new() } else { format!("_{}", n) };
                    dir.join(format!("{}_{}{}_bg_removed.{}", stem, source_ext, suffix, ext))
                })
                .find(|candidate| !inputs.contains(candidate.as_path()) && !taken.contains(candidate))
                .unwrap_or_else(|| path.clone());

            debug!(
                input = %file.path.display(),
                output = %unique.display(),
                "Output name taken, using a distinct name"
            );
            taken.insert(unique.clone());
            unique
        })
        .collect()
}

async fn process_batch(
    cli: &Cli,
    processor: Arc<BackgroundRemovalProcessor>,
    files: &[InputFile],
) -> Result<BatchSummary> {
    let output_format = processor.config().output_format;
    let output_dir = prepare_output_dir(cli.output.as_deref())?;
    let outputs = plan_output_paths(files, output_dir.as_deref(), output_format);

    let batch = BatchProcessor::from_processor(processor);
    let batch = if cli.progress {
        batch.with_progress_tracker(ProgressTracker::console(cli.verbose > 0))
    } else {
        batch
    };

    let batch_span = spans::batch_processing(files.len(), batch.concurrency());
    let _batch = batch_span.enter();

    let progress_bar = (!cli.progress).then(|| {
        let pb = ProgressBar::new(files.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    });

    let items = files
        .iter()
        .zip(outputs)
        .enumerate()
        .map(|(index, (file, output))| BatchItem::from_path(index, &file.path).with_output(output))
        .collect();

    let summary = batch
        .process_all_with(items, |outcome| {
            if let Some(pb) = &progress_bar {
                pb.set_message(outcome.name.clone());
                pb.inc(1);
            }

            match (&outcome.result, &outcome.output) {
                (Ok(_), Some(path)) => {
                    debug!(index = outcome.index, item = %outcome.name, output = %path.display(), "Saved");
                },
                (Ok(_), None) => {},
                (Err(e), _) => events::error_with_context(e, &format!("processing {}", outcome.name)),
            }
        })
        .await;

    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!(
            "Completed! Processed: {}, Failed: {}",
            summary.succeeded, summary.failed
        ));
    }

    if summary.failed > 0 {
        warn!(
            "Some files failed to process. Processed: {}, Failed: {}",
            summary.succeeded, summary.failed
        );
    }

    info!("📊 Batch processing summary:");
    info!("  ├─ Files processed: {}", summary.succeeded);
    info!("  ├─ Files failed: {}", summary.failed);
    info!(
        "  ├─ Pixels removed: {} of {}",
        summary.pixels.background_pixels, summary.pixels.total_pixels
    );
    info!("  └─ Total time: {:.2}s", summary.elapsed_ms as f64 / 1000.0);
    events::performance_metric("batch", summary.elapsed_ms);

    Ok(summary)
}

/// Validate and create the batch output directory
fn prepare_output_dir(output: Option<&str>) -> Result<Option<PathBuf>> {
    let Some(output) = output else {
        return Ok(None);
    };

    if output == "-" {
        anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
    }

    let output_path = PathBuf::from(output);
    if output_path.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output_path.display()
        );
    }
    std::fs::create_dir_all(&output_path).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_path.display()
        )
    })?;

    Ok(Some(output_path))
}

/// Process image from stdin; output defaults to stdout
async fn process_stdin(
    output_target: Option<&str>,
    processor: &BackgroundRemovalProcessor,
) -> Result<BatchSummary> {
    info!("Reading image from stdin");

    let image_data = read_stdin()?;
    let start_time = Instant::now();

    match image::guess_format(&image_data) {
        Ok(format) => info!("Detected image format: {:?}", format),
        Err(_) => warn!("Could not detect image format from stdin data"),
    }

    let result = processor
        .process_bytes(&image_data)
        .context("Failed to remove background from stdin data")?;

    let target = output_target.map_or(OutputTarget::Stdout, OutputTarget::parse);
    write_result(processor, &result, &target)?;

    info!(
        "Processed stdin image in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(BatchSummary {
        total: 1,
        succeeded: 1,
        pixels: result.stats,
        elapsed_ms: start_time.elapsed().as_millis() as u64,
        ..BatchSummary::default()
    })
}

/// Process a single image file and write it to `target`
fn process_single_file(
    processor: &BackgroundRemovalProcessor,
    input_path: &Path,
    target: &OutputTarget,
) -> Result<()> {
    let span = spans::file_processing(input_path, &processor.config().output_format.to_string());
    let _file = span.enter();

    let mut result = processor
        .process_file(input_path)
        .context("Failed to remove background")?;

    match target {
        OutputTarget::File(path) => {
            processor
                .save(&mut result, path)
                .with_context(|| format!("Failed to save result to {}", path.display()))?;
            events::progress(&format!("Image saved to: {}", path.display()), "💾");
        },
        OutputTarget::Stdout => write_result(processor, &result, target)?,
    }

    log_breakdown(input_path, &result);
    Ok(())
}

fn log_breakdown(input_path: &Path, result: &RemovalResult) {
    let timings = result.timings();
    let breakdown = timings.breakdown_percentages();

    info!("📊 Processing breakdown for {}:", input_path.display());
    info!(
        "  ├─ Image Decode: {}ms ({:.1}%)",
        timings.image_decode_ms, breakdown.decode_pct
    );
    info!(
        "  ├─ Segmentation: {}ms ({:.1}%), {} of {} pixels removed",
        timings.segmentation_ms,
        breakdown.segmentation_pct,
        result.stats.background_pixels,
        result.stats.total_pixels
    );
    if let Some(encode_ms) = timings.image_encode_ms {
        info!("  ├─ Image Encode: {}ms ({:.1}%)", encode_ms, breakdown.encode_pct);
    }
    info!(
        "  └─ Total: {}ms ({:.2}s)",
        timings.total_ms,
        timings.total_ms as f64 / 1000.0
    );
    events::performance_metric("segmentation", timings.segmentation_ms);
    events::performance_metric("total", timings.total_ms);
}

/// Encode a result with the processor's codec and write it out
fn write_result(
    processor: &BackgroundRemovalProcessor,
    result: &RemovalResult,
    target: &OutputTarget,
) -> Result<()> {
    let data = processor.encode(result).context("Failed to encode result")?;

    match target {
        OutputTarget::Stdout => {
            write_stdout(&data)?;
            info!("Image written to stdout");
        },
        OutputTarget::File(path) => {
            ImageIOService::write_bytes(path, &data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!(output = %path.display(), bytes = data.len(), "Result written");
        },
    }

    Ok(())
}

/// Read image data from stdin
fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;

    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }

    Ok(buffer)
}

/// Write image data to stdout
fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Find image files in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if is_image_file(path, &IMAGE_EXTENSIONS) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if is_image_file(&path, &IMAGE_EXTENSIONS) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Check if file is an image based on extension
fn is_image_file(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext.to_lowercase().as_str()))
}

/// Check if file name matches the given glob pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}

fn output_file_name(input_path: &Path, format: OutputFormat) -> String {
    let stem = input_path.file_stem().unwrap_or_default();
    format!(
        "{}_bg_removed.{}",
        stem.to_string_lossy(),
        OutputFormatHandler::get_extension(format)
    )
}

/// Output path next to the input
fn generate_output_path(input_path: &Path, format: OutputFormat) -> PathBuf {
    let dir = input_path.parent().unwrap_or(Path::new("."));
    dir.join(output_file_name(input_path, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("pixel-bgremove").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_parsing() {
        let cli = parse(&["a.png", "b.png", "-o", "out", "-f", "webp", "-s", "30", "-j", "4", "-r"]).unwrap();
        assert_eq!(cli.input, vec!["a.png", "b.png"]);
        assert_eq!(cli.output.as_deref(), Some("out"));
        assert_eq!(cli.format, Some(CliOutputFormat::Webp));
        assert_eq!(cli.sensitivity, Some(30.0));
        assert_eq!(cli.jobs, Some(4));
        assert!(cli.recursive);
        assert!(!cli.no_parallel);
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["-f", "jpeg", "a.png"]).is_err());
    }

    #[test]
    fn test_cli_stdin_input() {
        let cli = parse(&["-", "-o", "-"]).unwrap();
        assert_eq!(cli.input, vec!["-"]);
        assert_eq!(OutputTarget::parse(cli.output.as_deref().unwrap()), OutputTarget::Stdout);
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("test.jpg"), &IMAGE_EXTENSIONS));
        assert!(is_image_file(Path::new("test.PNG"), &IMAGE_EXTENSIONS));
        assert!(is_image_file(Path::new("dir/test.tif"), &IMAGE_EXTENSIONS));
        assert!(!is_image_file(Path::new("test.txt"), &IMAGE_EXTENSIONS));
        assert!(!is_image_file(Path::new("test"), &IMAGE_EXTENSIONS));
    }

    #[test]
    fn test_matches_pattern() {
        let path = Path::new("dir/photo_01.jpg");
        assert!(matches_pattern(path, None));
        assert!(matches_pattern(path, Some("*.jpg")));
        assert!(matches_pattern(path, Some("photo_*")));
        assert!(!matches_pattern(path, Some("*.png")));
        assert!(!matches_pattern(path, Some("[invalid")));
    }

    #[test]
    fn test_generate_output_path() {
        assert_eq!(
            generate_output_path(Path::new("/tmp/photos/cat.jpg"), OutputFormat::Png),
            PathBuf::from("/tmp/photos/cat_bg_removed.png")
        );
        assert_eq!(
            generate_output_path(Path::new("cat.jpeg"), OutputFormat::WebP),
            PathBuf::from("cat_bg_removed.webp")
        );
    }

    fn listed(path: &str) -> InputFile {
        InputFile {
            path: PathBuf::from(path),
            root: None,
        }
    }

    fn found(root: &str, path: &str) -> InputFile {
        InputFile {
            path: PathBuf::from(path),
            root: Some(PathBuf::from(root)),
        }
    }

    #[test]
    fn test_plan_mirrors_input_directories() {
        let files = [
            found("/in", "/in/a/img.png"),
            found("/in", "/in/b/img.png"),
            found("/in", "/in/top.png"),
        ];
        let planned = plan_output_paths(&files, Some(Path::new("/out")), OutputFormat::Rgba8);
        assert_eq!(
            planned,
            vec![
                PathBuf::from("/out/a/img_bg_removed.raw"),
                PathBuf::from("/out/b/img_bg_removed.raw"),
                PathBuf::from("/out/top_bg_removed.raw"),
            ]
        );
    }

    #[test]
    fn test_plan_disambiguates_same_stem() {
        // Same stem, different extensions, one directory
        let files = [listed("/p/img.jpg"), listed("/p/img.png"), listed("/p/img.webp")];
        let planned = plan_output_paths(&files, None, OutputFormat::Png);
        assert_eq!(
            planned,
            vec![
                PathBuf::from("/p/img_bg_removed.png"),
                PathBuf::from("/p/img_png_bg_removed.png"),
                PathBuf::from("/p/img_webp_bg_removed.png"),
            ]
        );

        // Same file name from two directories into one flat output directory
        let files = [listed("/x/img.png"), listed("/y/img.png"), listed("/z/img.png")];
        let planned = plan_output_paths(&files, Some(Path::new("/out")), OutputFormat::Png);
        assert_eq!(
            planned,
            vec![
                PathBuf::from("/out/img_bg_removed.png"),
                PathBuf::from("/out/img_png_bg_removed.png"),
                PathBuf::from("/out/img_png_2_bg_removed.png"),
            ]
        );
    }

    #[test]
    fn test_plan_never_targets_an_input() {
        let files = [listed("/p/img.png"), listed("/p/img_bg_removed.png")];
        let planned = plan_output_paths(&files, None, OutputFormat::Png);

        assert_eq!(planned[0], PathBuf::from("/p/img_png_bg_removed.png"));
        assert_eq!(planned[1], PathBuf::from("/p/img_bg_removed_bg_removed.png"));
    }

    #[test]
    fn test_plan_avoids_names_other_inputs_produce() {
        // The variant for the second img must skip the name img_png.png produces
        let files = [listed("/p/img.jpg"), listed("/p/img.png"), listed("/p/img_png.png")];
        let planned = plan_output_paths(&files, None, OutputFormat::Png);

        assert_eq!(planned[0], PathBuf::from("/p/img_bg_removed.png"));
        assert_eq!(planned[2], PathBuf::from("/p/img_png_bg_removed.png"));
        assert_eq!(planned[1], PathBuf::from("/p/img_png_2_bg_removed.png"));
    }

    #[test]
    fn test_collect_input_files_tracks_roots() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("sub");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("inner.png"), b"x").unwrap();
        let direct = temp_dir.path().join("direct.png");
        fs::write(&direct, b"x").unwrap();

        let dir_arg = temp_dir.path().to_str().unwrap();
        let cli = parse(&[dir_arg, direct.to_str().unwrap(), "-r"]).unwrap();
        let files = collect_input_files(&cli).unwrap();

        // direct.png is found through the directory too; listed once
        assert_eq!(files.len(), 2);
        let inner = files.iter().find(|f| f.path.ends_with("sub/inner.png")).unwrap();
        assert_eq!(inner.relative_dir(), Path::new("sub"));
        assert_eq!(listed("/a/b.png").relative_dir(), Path::new(""));
    }

    #[test]
    fn test_cli_log_flags() {
        let cli = parse(&["a.png"]).unwrap();
        assert_eq!(cli.log_format, CliLogFormat::Console);
        assert!(cli.log_file.is_none());

        let cli = parse(&["a.png", "--log-format", "json", "--log-file", "run.log"]).unwrap();
        assert_eq!(cli.log_format, CliLogFormat::Json);
        assert_eq!(cli.log_file, Some(PathBuf::from("run.log")));
        assert!(parse(&["a.png", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn test_find_image_files_in_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let files = find_image_files(temp_dir.path(), false, None).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_find_image_files_with_pattern() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.jpg", "b.png", "c.txt", "d.jpg"] {
            fs::write(temp_dir.path().join(name), b"x").unwrap();
        }

        let files = find_image_files(temp_dir.path(), false, Some("*.jpg")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "d.jpg"]);
    }

    #[test]
    fn test_find_image_files_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("sub/deeper");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp_dir.path().join("top.png"), b"x").unwrap();
        fs::write(nested.join("inner.png"), b"x").unwrap();

        assert_eq!(find_image_files(temp_dir.path(), false, None).unwrap().len(), 1);
        assert_eq!(find_image_files(temp_dir.path(), true, None).unwrap().len(), 2);
    }

    #[test]
    fn test_find_image_files_alphanumerical_sorting() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["z_last.png", "a_first.png", "img10.png", "img2.png", "img1.png"] {
            fs::write(temp_dir.path().join(name), b"x").unwrap();
        }

        let files = find_image_files(temp_dir.path(), false, None).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["a_first.png", "img1.png", "img10.png", "img2.png", "z_last.png"]
        );
    }

    #[test]
    fn test_prepare_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(prepare_output_dir(None).unwrap(), None);
        assert!(prepare_output_dir(Some("-")).is_err());

        let out = temp_dir.path().join("results");
        let created = prepare_output_dir(out.to_str()).unwrap().unwrap();
        assert!(created.is_dir());

        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();
        assert!(prepare_output_dir(file.to_str()).is_err());
    }

    #[test]
    fn test_write_stdout_empty_data() {
        assert!(write_stdout(&[]).is_ok());
    }
}
