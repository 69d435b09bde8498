//! Error types for background removal operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error taxonomy for one background removal invocation
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// The input image path does not exist
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Image bytes could not be decoded
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Image could not be encoded
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// A `file://` model reference points at a missing file
    #[error("Model file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The inference engine rejected the model
    #[error("Failed to create inference session: {0}")]
    SessionCreate(String),

    /// Inference runtime failure while running a session
    #[error("Inference error: {0}")]
    Inference(String),

    /// Umbrella for anything the removal pipeline raises
    #[error("Processing error: {0}")]
    Processing(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BgRemovalError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new session creation error
    pub fn session_create<S: Into<String>>(msg: S) -> Self {
        Self::SessionCreate(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str) -> Self {
        Self::Processing(format!("Processing failed at stage '{stage}': {details}"))
    }

    /// Whether the error comes from loading the model rather than the image
    #[must_use]
    pub fn is_model_error(&self) -> bool {
        matches!(self, Self::FileNotFound(_) | Self::SessionCreate(_))
    }
}
