//! Inference engine abstraction and session creation
//!
//! [`SessionFactory::create_session`] accepts either an in-memory model or a
//! location string. `file://` locations are read into memory first, since
//! engines are only required to load models from bytes; every other
//! location is handed to the engine unchanged.

use crate::{
    config::SessionOptions,
    error::{BgRemovalError, Result},
};
use async_trait::async_trait;
use ndarray::Array4;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Scheme prefix of model locations that are read from the local filesystem
pub const FILE_SCHEME: &str = "file://";

/// Input side length of the `ISNet` models
pub const ISNET_INPUT_SIZE: u32 = 1024;

/// Reference to a segmentation model
#[derive(Clone, PartialEq, Eq)]
pub enum ModelRef {
    /// Model bytes already in memory
    Buffer(Vec<u8>),
    /// `file://<path>` or an engine-specific location
    Location(String),
}

impl ModelRef {
    /// Filesystem path for `file://` locations
    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        match self {
            Self::Location(location) => location.strip_prefix(FILE_SCHEME).map(PathBuf::from),
            Self::Buffer(_) => None,
        }
    }
}

impl std::fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            Self::Location(location) => write!(f, "Location({location})"),
        }
    }
}

impl From<Vec<u8>> for ModelRef {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<&str> for ModelRef {
    fn from(location: &str) -> Self {
        Self::Location(location.to_string())
    }
}

impl From<String> for ModelRef {
    fn from(location: String) -> Self {
        Self::Location(location)
    }
}

/// A loaded model ready to run
pub trait InferenceSession: Send {
    /// Run the model on an NCHW tensor and return its first output
    ///
    /// # Errors
    /// - Runtime failures
    /// - Output that is not a 4D f32 tensor
    fn run(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Side length of the square input the model expects
    fn input_size(&self) -> u32;
}

/// Operations the removal pipeline needs from an inference runtime
pub trait InferenceEngine: Send + Sync {
    /// Short identifier used in logs and CLI selection
    fn name(&self) -> &'static str;

    /// Create a session from model bytes
    ///
    /// # Errors
    /// `BgRemovalError::SessionCreate` when the runtime rejects the model
    fn create_session(
        &self,
        model: &[u8],
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>>;

    /// Create a session from a location the engine resolves itself
    ///
    /// # Errors
    /// `BgRemovalError::SessionCreate` when the location cannot be loaded
    fn create_session_from_location(
        &self,
        location: &str,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>>;
}

/// Source of model bytes for `file://` references
#[async_trait]
pub trait ModelReader: Send + Sync {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// Reads models with `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct FsModelReader;

#[async_trait]
impl ModelReader for FsModelReader {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

/// Resolves a [`ModelRef`] and creates a session on the configured engine
#[derive(Clone)]
pub struct SessionFactory {
    engine: Arc<dyn InferenceEngine>,
    reader: Arc<dyn ModelReader>,
}

impl std::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("engine", &self.engine.name())
            .finish_non_exhaustive()
    }
}

impl SessionFactory {
    #[must_use]
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self::with_reader(engine, Arc::new(FsModelReader))
    }

    #[must_use]
    pub fn with_reader(engine: Arc<dyn InferenceEngine>, reader: Arc<dyn ModelReader>) -> Self {
        Self { engine, reader }
    }

    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Create an inference session for `model`
    ///
    /// Model parsing and optimization run on the blocking thread pool. There
    /// is no retry; the first failure is returned.
    ///
    /// # Errors
    /// - `BgRemovalError::FileNotFound` for a `file://` path that does not exist
    /// - `BgRemovalError::Io` for other read failures
    /// - `BgRemovalError::SessionCreate` when the engine rejects the model
    #[instrument(skip(self, options), fields(engine = self.engine.name()))]
    pub async fn create_session(
        &self,
        model: &ModelRef,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        let options = *options;
        match model {
            ModelRef::Buffer(bytes) => {
                debug!(bytes = bytes.len(), "Creating session from in-memory model");
                let bytes = bytes.clone();
                self.on_blocking_pool(move |engine| engine.create_session(&bytes, &options))
                    .await
            },
            ModelRef::Location(location) => {
                if let Some(path) = model.file_path() {
                    let bytes = self.read_model(&path).await?;
                    info!(
                        path = %path.display(),
                        size_mb = bytes.len() as f64 / (1024.0 * 1024.0),
                        "Loaded model file"
                    );
                    self.on_blocking_pool(move |engine| engine.create_session(&bytes, &options))
                        .await
                } else {
                    debug!(%location, "Passing model location to engine unchanged");
                    let location = location.clone();
                    self.on_blocking_pool(move |engine| {
                        engine.create_session_from_location(&location, &options)
                    })
                    .await
                }
            },
        }
    }

    async fn on_blocking_pool<F>(&self, create: F) -> Result<Box<dyn InferenceSession>>
    where
        F: FnOnce(&dyn InferenceEngine) -> Result<Box<dyn InferenceSession>> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || create(engine.as_ref()))
            .await
            .map_err(|e| BgRemovalError::session_create(format!("session task failed: {e}")))?
    }

    async fn read_model(&self, path: &Path) -> Result<Vec<u8>> {
        self.reader.read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BgRemovalError::FileNotFound(path.to_path_buf())
            } else {
                BgRemovalError::file_io_error("read model file", path, &e)
            }
        })
    }
}
