//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Segmentation model size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    /// Quantized `ISNet` (fastest, least accurate)
    Small,
    /// Half-precision `ISNet`
    #[default]
    Medium,
    /// Full-precision `ISNet`
    Large,
}

impl ModelSize {
    /// Model name used to locate the model file under the public path
    #[must_use]
    pub fn model_name(self) -> &'static str {
        match self {
            Self::Small => "isnet_quint8",
            Self::Medium => "isnet_fp16",
            Self::Large => "isnet",
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Small => write!(f, "small"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown model '{other}'. Expected one of: small, medium, large"
            ))),
        }
    }
}

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency)
    Jpeg,
    /// WebP with alpha channel transparency
    WebP,
}

impl OutputFormat {
    /// Format name understood by [`crate::codec::ImageCodec::resolve_format`]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::WebP => "webp",
        }
    }

    /// MIME type of the encoded output
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Whether the format keeps an alpha channel
    #[must_use]
    pub fn supports_transparency(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown output format '{other}'. Expected one of: png, jpeg, webp"
            ))),
        }
    }
}

/// What to keep from the segmented image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalMode {
    /// Keep the foreground, make the background transparent
    #[default]
    RemoveBackground,
    /// Keep the background, make the foreground transparent
    RemoveForeground,
    /// Emit the segmentation mask only
    SegmentOnly,
}

impl RemovalMode {
    /// Spinner text shown while the mode runs
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::RemoveBackground => "Removing background...",
            Self::RemoveForeground => "Removing foreground...",
            Self::SegmentOnly => "Generating segmentation mask...",
        }
    }
}

/// Options forwarded to the inference engine when a session is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Number of intra-op threads
    pub num_threads: usize,
    /// Apply graph optimizations while loading the model
    pub optimize: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            num_threads: 1,
            optimize: true,
        }
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Segmentation model size
    pub model: ModelSize,

    /// Output format
    pub output_format: OutputFormat,

    /// Output quality for lossy formats (0.0-1.0)
    pub quality: f32,

    /// Which part of the image to keep
    pub mode: RemovalMode,

    /// Enable debug mode (additional logging)
    pub debug: bool,

    /// Base location for models, either `file://<dir>/` or an engine-specific location
    pub public_path: String,

    /// Session options for the inference engine
    pub session: SessionOptions,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model: ModelSize::default(),
            output_format: OutputFormat::default(),
            quality: 0.9,
            mode: RemovalMode::default(),
            debug: false,
            public_path: default_public_path(),
            session: SessionOptions::default(),
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use bg_remover::{OutputFormat, RemovalConfig, RemovalMode};
    ///
    /// let config = RemovalConfig::builder()
    ///     .output_format(OutputFormat::Jpeg)
    ///     .quality(0.8)
    ///     .mode(RemovalMode::SegmentOnly)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.output_format, OutputFormat::Jpeg);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Quality outside 0.0-1.0 or not finite
    /// - Zero session threads
    /// - Empty public path
    pub fn validate(&self) -> Result<()> {
        if !self.quality.is_finite() || !(0.0..=1.0).contains(&self.quality) {
            return Err(BgRemovalError::config_value_error(
                "quality",
                self.quality,
                "0-1",
                Some(0.9),
            ));
        }

        if self.session.num_threads == 0 {
            return Err(BgRemovalError::config_value_error(
                "thread count",
                self.session.num_threads,
                "1 or more",
                Some(1),
            ));
        }

        if self.public_path.trim().is_empty() {
            return Err(BgRemovalError::invalid_config("Public path must not be empty"));
        }

        Ok(())
    }

    /// Location of the model file for the configured size
    ///
    /// The public path is treated as a directory prefix; a missing trailing
    /// slash is added.
    #[must_use]
    pub fn model_location(&self) -> String {
        let base = self.public_path.trim_end_matches('/');
        format!("{base}/models/{}.onnx", self.model.model_name())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Set model size
    #[must_use]
    pub fn model(mut self, model: ModelSize) -> Self {
        self.config.model = model;
        self
    }

    /// Set output format
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Set output quality (validated at build time)
    #[must_use]
    pub fn quality(mut self, quality: f32) -> Self {
        self.config.quality = quality;
        self
    }

    /// Set removal mode
    #[must_use]
    pub fn mode(mut self, mode: RemovalMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Enable debug mode
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Set the base location for model assets
    #[must_use]
    pub fn public_path<S: Into<String>>(mut self, public_path: S) -> Self {
        self.config.public_path = public_path.into();
        self
    }

    /// Set number of intra-op threads for the inference session
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.session.num_threads = threads;
        self
    }

    /// Enable or disable graph optimization
    #[must_use]
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.config.session.optimize = optimize;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `BgRemovalError::InvalidConfig` when validation fails
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Default public path: an `assets/` directory next to the executable
#[must_use]
pub fn default_public_path() -> String {
    let base = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    format!("file://{}/assets/", base.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RemovalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model, ModelSize::Medium);
        assert_eq!(config.output_format, OutputFormat::Png);
        assert!((config.quality - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.session.num_threads, 1);
        assert!(config.public_path.starts_with("file://"));
    }

    #[test]
    fn test_quality_validation() {
        assert!(RemovalConfig::builder().quality(0.0).build().is_ok());
        assert!(RemovalConfig::builder().quality(1.0).build().is_ok());
        assert!(RemovalConfig::builder().quality(1.5).build().is_err());
        assert!(RemovalConfig::builder().quality(-0.1).build().is_err());
        assert!(RemovalConfig::builder().quality(f32::NAN).build().is_err());
    }

    #[test]
    fn test_thread_and_path_validation() {
        assert!(RemovalConfig::builder().num_threads(0).build().is_err());
        assert!(RemovalConfig::builder().public_path("  ").build().is_err());
    }

    #[test]
    fn test_model_names() {
        assert_eq!(ModelSize::Small.model_name(), "isnet_quint8");
        assert_eq!(ModelSize::Medium.model_name(), "isnet_fp16");
        assert_eq!(ModelSize::Large.model_name(), "isnet");
        assert_eq!("LARGE".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert!("huge".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("webp".parse::<OutputFormat>().unwrap(), OutputFormat::WebP);
        assert!("gif".parse::<OutputFormat>().is_err());
        assert!(!OutputFormat::Jpeg.supports_transparency());
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
    }

    #[test]
    fn test_model_location() {
        let config = RemovalConfig::builder()
            .public_path("file:///opt/bg/assets/")
            .model(ModelSize::Small)
            .build()
            .unwrap();
        assert_eq!(
            config.model_location(),
            "file:///opt/bg/assets/models/isnet_quint8.onnx"
        );

        let config = RemovalConfig::builder()
            .public_path("https://cdn.example.com/dist")
            .build()
            .unwrap();
        assert_eq!(
            config.model_location(),
            "https://cdn.example.com/dist/models/isnet_fp16.onnx"
        );
    }

    #[test]
    fn test_config_serializes_to_json() {
        let config = RemovalConfig::builder()
            .mode(RemovalMode::RemoveForeground)
            .public_path("file:///tmp/")
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"remove-foreground\""));
        let back: RemovalConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
