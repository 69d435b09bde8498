//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliEngine, CliLogFormat, CliModel, CliOutputFormat};
use crate::{
    config::{ModelSize, OutputFormat, RemovalConfig, RemovalMode},
    inference::InferenceEngine,
    services::EnvironmentOverrides,
    tracing_config::TracingFormat,
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Convert CLI arguments to a validated `RemovalConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the removal configuration from CLI arguments and environment
    pub(crate) fn from_cli(cli: &Cli, overrides: &EnvironmentOverrides) -> Result<RemovalConfig> {
        RemovalConfig::builder()
            .model(cli.model.into())
            .output_format(cli.format.into())
            .quality(cli.quality)
            .mode(Self::mode(cli))
            .debug(cli.debug)
            .public_path(overrides.public_path())
            .num_threads(cli.threads)
            .build()
            .context("Invalid command-line arguments")
    }

    /// Removal mode selected by the mutually exclusive mode flags
    pub(crate) fn mode(cli: &Cli) -> RemovalMode {
        if cli.segment_only {
            RemovalMode::SegmentOnly
        } else if cli.remove_foreground {
            RemovalMode::RemoveForeground
        } else {
            RemovalMode::RemoveBackground
        }
    }

    /// Effective tracing verbosity; `--debug` implies at least `-vv`
    pub(crate) fn verbosity(cli: &Cli) -> u8 {
        if cli.debug {
            cli.verbose.max(2)
        } else {
            cli.verbose
        }
    }

    /// Log output format selected with `--log-format`
    pub(crate) fn log_format(cli: &Cli) -> Result<TracingFormat> {
        match cli.log_format {
            CliLogFormat::Console => Ok(TracingFormat::Console),
            CliLogFormat::Compact => Ok(TracingFormat::Compact),
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Ok(TracingFormat::Json),
            #[allow(unreachable_patterns)]
            other => anyhow::bail!(
                "Log format '{}' is not available in this build; rebuild with the `tracing-json` feature",
                other.name()
            ),
        }
    }

    /// Inference engine selected with `--engine`
    pub(crate) fn engine(cli: &Cli) -> Result<Arc<dyn InferenceEngine>> {
        match cli.engine {
            #[cfg(feature = "tract")]
            CliEngine::Tract => Ok(Arc::new(crate::backends::TractEngine::new())),
            #[cfg(feature = "onnx")]
            CliEngine::Onnx => Ok(Arc::new(crate::backends::OnnxEngine::new())),
            #[allow(unreachable_patterns)]
            other => anyhow::bail!(
                "Engine '{}' is not available in this build; rebuild with the `{}` feature",
                other.name(),
                other.name()
            ),
        }
    }
}

impl From<CliModel> for ModelSize {
    fn from(model: CliModel) -> Self {
        match model {
            CliModel::Small => ModelSize::Small,
            CliModel::Medium => ModelSize::Medium,
            CliModel::Large => ModelSize::Large,
        }
    }
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Webp => OutputFormat::WebP,
        }
    }
}
