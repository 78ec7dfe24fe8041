//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliLogFormat, CliOutputFormat};
use crate::{
    config::{OutputFormat, RemovalConfig},
    tracing_config::{TracingConfig, TracingFormat, TracingOutput},
    types::Sensitivity,
};
use anyhow::{Context, Result};
use tracing::warn;

/// Convert CLI arguments to a `RemovalConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: JSON config file first, then explicit flags on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let mut config = match &cli.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => RemovalConfig::default(),
        };

        if let Some(requested) = cli.sensitivity {
            let sensitivity = Sensitivity::clamped(requested);
            if sensitivity.value().to_bits() != requested.to_bits() {
                warn!(
                    requested = %requested,
                    used = %sensitivity,
                    "Sensitivity outside 0-100, clamped"
                );
            }
            config.sensitivity = sensitivity.value();
        }

        if let Some(format) = cli.format {
            config.output_format = format.into();
        }

        if let Some(jobs) = cli.jobs {
            config.max_concurrent_images = jobs;
        }

        if cli.no_parallel {
            config.parallel = false;
        }

        config.debug = config.debug || cli.verbose >= 2;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Logging setup for one run, tagged with the run's session id
    ///
    /// Log formats and destinations compiled out of this build are rejected
    /// instead of silently falling back to the console.
    pub(crate) fn tracing_config(cli: &Cli, session_id: &str) -> Result<TracingConfig> {
        let format = match cli.log_format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => TracingFormat::Json,
            #[cfg(not(feature = "tracing-json"))]
            CliLogFormat::Json => {
                anyhow::bail!("--log-format json needs a build with the `tracing-json` feature")
            },
        };

        let output = match &cli.log_file {
            None => TracingOutput::Console,
            #[cfg(feature = "tracing-files")]
            Some(path) => TracingOutput::File(path.clone()),
            #[cfg(not(feature = "tracing-files"))]
            Some(_) => {
                anyhow::bail!("--log-file needs a build with the `tracing-files` feature")
            },
        };

        Ok(TracingConfig::new()
            .with_verbosity(cli.verbose)
            .with_format(format)
            .with_output(output)
            .with_session_id(session_id))
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.input.iter().any(|input| input == "-") && cli.input.len() > 1 {
            anyhow::bail!("Stdin (-) cannot be combined with other inputs");
        }

        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid file pattern '{}'", pattern))?;
        }

        Ok(())
    }
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Webp => OutputFormat::WebP,
            CliOutputFormat::Tiff => OutputFormat::Tiff,
            CliOutputFormat::Rgba8 => OutputFormat::Rgba8,
        }
    }
}
