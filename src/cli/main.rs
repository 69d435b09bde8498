//! Background Removal CLI Tool
//!
//! Removes the background (or foreground) of a single image and writes the
//! result next to a progress spinner on stderr.

use super::config::CliConfigBuilder;
use crate::{
    config::{OutputFormat, RemovalMode},
    error::BgRemovalError,
    processor::BackgroundRemover,
    services::{
        ensure_input_exists, progress::ConsoleProgressReporter, progress::percent, read_input,
        write_output, EnvironmentOverrides, ProcessingStage, ProgressReporter, Services,
        IMGLY_PUBLIC_PATH_VAR,
    },
    tracing_config::{spans, TracingConfig, TracingFormat},
    types::ProcessingTimings,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Remove image backgrounds with an ISNet segmentation model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bg-remover")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image path
    #[arg(short, long, value_name = "INPUT")]
    pub input: PathBuf,

    /// Output image path
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Model size
    #[arg(short, long, value_enum, default_value_t = CliModel::Medium)]
    pub model: CliModel,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// Output quality for lossy formats (0-1)
    #[arg(short, long, default_value_t = 0.9)]
    pub quality: f32,

    /// Remove foreground instead of background
    #[arg(long, conflicts_with = "segment_only")]
    pub remove_foreground: bool,

    /// Only output the segmentation mask
    #[arg(long)]
    pub segment_only: bool,

    /// Inference engine
    #[arg(long, value_enum, default_value_t = CliEngine::Tract)]
    pub engine: CliEngine,

    /// Number of inference threads
    #[arg(short, long, default_value_t = 1)]
    pub threads: usize,

    /// Log output format (`json` requires the `tracing-json` feature)
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Enable debug mode (configuration dump and error details)
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliModel {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliOutputFormat {
    Png,
    #[value(alias = "jpg")]
    Jpeg,
    Webp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliEngine {
    /// Pure-Rust inference
    Tract,
    /// ONNX Runtime
    Onnx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogFormat {
    /// Colored human-readable output
    Console,
    /// Plain output without ANSI colors
    Compact,
    /// One JSON object per event
    Json,
}

impl CliLogFormat {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CliLogFormat::Console => "console",
            CliLogFormat::Compact => "compact",
            CliLogFormat::Json => "json",
        }
    }
}

impl CliEngine {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CliEngine::Tract => "tract",
            CliEngine::Onnx => "onnx",
        }
    }
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output: PathBuf,
    pub bytes_written: usize,
    /// Encoded size in kilobytes
    pub size_kb: f64,
    /// Format actually written, after any fallback
    pub format: OutputFormat,
    pub mode: RemovalMode,
    pub timings: ProcessingTimings,
}

/// Spinner that shows `<key>: <percent>%` for each progress update
struct SpinnerProgressReporter {
    bar: ProgressBar,
    console: ConsoleProgressReporter,
}

impl SpinnerProgressReporter {
    fn new(mode: RemovalMode, verbose: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(mode.description());
        Self {
            bar,
            console: ConsoleProgressReporter::new(verbose),
        }
    }
}

impl ProgressReporter for SpinnerProgressReporter {
    fn report(&self, key: &str, current: u64, total: u64) {
        self.bar
            .set_message(format!("{key}: {}%", percent(current, total)));
    }

    fn report_stage(&self, stage: ProcessingStage, done: bool) {
        if !done {
            debug!("{}", stage.description());
        }
        self.report(stage.key(), u64::from(done), 1);
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        self.console.report_completion(timings);
    }
}

/// Run one removal from parsed arguments
///
/// # Errors
/// - The input file is missing (checked before anything else)
/// - Arguments do not form a valid configuration
/// - Any pipeline stage fails
/// - The output cannot be written
pub async fn run(
    cli: &Cli,
    services: Services,
    overrides: &EnvironmentOverrides,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<RunSummary> {
    ensure_input_exists(&cli.input)?;
    remove(cli, services, overrides, reporter).await
}

/// Services for the engine selected on the command line
fn cli_services(cli: &Cli) -> Result<Services> {
    let engine = CliConfigBuilder::engine(cli)?;
    Services::builder()
        .engine(engine)
        .build()
        .context("Failed to set up services")
}

/// Everything after the input check
async fn remove(
    cli: &Cli,
    services: Services,
    overrides: &EnvironmentOverrides,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<RunSummary> {
    let config = CliConfigBuilder::from_cli(cli, overrides)?;
    info!("Input: {}", cli.input.display());
    info!("Model: {}", config.model_location());

    let input = read_input(&cli.input).await?;

    let mut remover = BackgroundRemover::new(services, config)
        .context("Failed to create background remover")?
        .with_progress(reporter);
    let output = remover.process(&input).await?;

    write_output(&cli.output, &output.bytes)
        .await
        .context("Failed to write output image")?;

    debug!(
        "Wrote {} bytes to {} as {}",
        output.bytes.len(),
        cli.output.display(),
        output.format.mime_type()
    );

    Ok(RunSummary {
        output: cli.output.clone(),
        bytes_written: output.bytes.len(),
        size_kb: output.size_kb(),
        format: output.format,
        mode: output.mode,
        timings: output.timings,
    })
}

pub async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = err.print();
            return code;
        },
    };

    std::panic::set_hook(Box::new(|info| {
        eprintln!("Unhandled error: {info}");
        std::process::exit(1);
    }));

    let overrides = EnvironmentOverrides::from_env();
    overrides.apply();

    let invocation_id = uuid::Uuid::new_v4().to_string();
    if let Err(err) = init_tracing(&cli, &invocation_id) {
        eprintln!("Warning: {err:#}");
    }

    let span = spans::invocation(&invocation_id, &cli.input, cli.engine.name());
    let mode = CliConfigBuilder::mode(&cli);
    let spinner = Arc::new(SpinnerProgressReporter::new(mode, cli.verbose > 0));

    let result = async {
        // a missing input wins over every other error, engine selection included
        ensure_input_exists(&cli.input)?;
        let services = cli_services(&cli)?;
        remove(&cli, services, &overrides, spinner.clone()).await
    }
    .instrument(span)
    .await;

    match result {
        Ok(summary) => {
            spinner
                .bar
                .finish_with_message("✓ Image processed successfully!");
            println!("Output saved to: {}", summary.output.display());
            println!("Size: {:.2} KB", summary.size_kb);
            ExitCode::SUCCESS
        },
        Err(err) => {
            spinner.bar.abandon_with_message("Processing failed");
            eprintln!("Error: {err:#}");
            if let Some(hint) = error_hint(&err, &overrides) {
                eprintln!("{hint}");
            }
            if cli.debug {
                eprintln!("{err:?}");
            }
            ExitCode::FAILURE
        },
    }
}

/// Extra guidance printed after the error line
fn error_hint(err: &anyhow::Error, overrides: &EnvironmentOverrides) -> Option<String> {
    let model_error = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<BgRemovalError>())
        .any(BgRemovalError::is_model_error);
    model_error.then(|| {
        format!(
            "Hint: models are resolved from {}models/; set {IMGLY_PUBLIC_PATH_VAR} to change it",
            with_trailing_slash(&overrides.public_path())
        )
    })
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

fn init_tracing(cli: &Cli, invocation_id: &str) -> Result<()> {
    let format = CliConfigBuilder::log_format(cli).unwrap_or_else(|err| {
        eprintln!("Warning: {err:#}");
        TracingFormat::Console
    });

    TracingConfig::new()
        .with_verbosity(CliConfigBuilder::verbosity(cli))
        .with_format(format)
        .with_env_override()
        .with_invocation_id(invocation_id)
        .init()
        .context("Failed to initialize tracing subscriber")
}
