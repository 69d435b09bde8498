#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # bg-remover
//!
//! Background removal for single images with an `ISNet` segmentation model.
//!
//! The crate is built around two narrow adapter traits:
//!
//! - [`ImageCodec`]: the image operations the pipeline needs (inspect,
//!   decode, encode), implemented over the `image` crate by
//!   [`ImageCrateCodec`] and driven through the deferred [`ImageHandle`]
//!   builder.
//! - [`InferenceEngine`]: turns a model buffer or location into an
//!   [`InferenceSession`], implemented by the pure-Rust Tract engine and,
//!   with the `onnx` feature, by ONNX Runtime.
//!
//! Both are wired together once in [`Services`] and handed to the
//! [`BackgroundRemover`] pipeline. Nothing is looked up globally.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bg_remover::{BackgroundRemover, OutputFormat, RemovalConfig, RemovalMode, Services};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder()
//!     .mode(RemovalMode::RemoveBackground)
//!     .output_format(OutputFormat::Png)
//!     .public_path("file:///opt/bg-remover/assets/")
//!     .build()?;
//!
//! let mut remover = BackgroundRemover::new(Services::portable()?, config)?;
//! let input = tokio::fs::read("input.jpg").await?;
//! let output = remover.process(&input).await?;
//! tokio::fs::write("output.png", &output.bytes).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): Pure Rust engine
//! - `onnx`: ONNX Runtime engine with CUDA/`CoreML` execution providers
//! - `onnx-dynamic`: load the ONNX Runtime library at runtime
//! - `cli` (default): Command-line interface and progress spinner
//! - `tracing-json`: JSON log output for the CLI
//! - `webp-support` (default): WebP output
//! - `test-utils`: deterministic `backends::mock` engine for downstream tests
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! bg-remover = { version = "1.0", default-features = false, features = ["tract"] }
//! ```

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod inference;
pub mod processor;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use codec::{
    ContainerFormat, EncodeOptions, ImageCodec, ImageCrateCodec, ImageHandle, ImageMetadata,
    RawImage, RawLayout,
};
pub use config::{ModelSize, OutputFormat, RemovalConfig, RemovalMode, SessionOptions};
pub use error::{BgRemovalError, Result};
pub use inference::{
    FsModelReader, InferenceEngine, InferenceSession, ModelReader, ModelRef, SessionFactory,
};
pub use processor::BackgroundRemover;
pub use services::{
    EnvironmentOverrides, NoOpProgressReporter, ProcessingStage, ProgressReporter, Services,
};
pub use types::{MaskStatistics, ProcessingTimings, RemovalOutput, SegmentationMask};
pub use utils::{ImagePreprocessor, PreprocessingOptions};

#[cfg(any(test, feature = "test-utils"))]
pub use backends::{mock::MockMask, MockEngine};
#[cfg(feature = "onnx")]
pub use backends::OnnxEngine;
#[cfg(feature = "tract")]
pub use backends::TractEngine;

#[cfg(feature = "cli")]
pub use tracing_config::{spans, TracingConfig, TracingFormat};

/// Remove the background of an encoded image in one call
///
/// Builds a throwaway [`BackgroundRemover`]; keep one around instead when
/// processing several images so the model is loaded only once.
///
/// # Examples
///
/// ```rust,no_run
/// use bg_remover::{remove_background, RemovalConfig, Services};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let output = remove_background(Services::portable()?, RemovalConfig::default(), &upload).await?;
/// println!("{}x{} {}", output.width, output.height, output.format);
/// # Ok(())
/// # }
/// ```
pub async fn remove_background(
    services: Services,
    config: RemovalConfig,
    image_bytes: &[u8],
) -> Result<RemovalOutput> {
    BackgroundRemover::new(services, config)?
        .process(image_bytes)
        .await
}
