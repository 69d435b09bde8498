//! Composition root
//!
//! [`Services`] is built once at process start and handed to the removal
//! pipeline and the CLI. It decides which image codec and inference engine
//! the rest of the crate talks to; nothing looks adapters up globally.

pub mod io;
pub mod progress;

pub use io::{ensure_input_exists, read_input, write_output};
pub use progress::{NoOpProgressReporter, ProcessingStage, ProgressReporter};

use crate::codec::{ImageCodec, ImageCrateCodec};
use crate::config::default_public_path;
use crate::error::{BgRemovalError, Result};
use crate::inference::{FsModelReader, InferenceEngine, ModelReader, SessionFactory};
use std::sync::Arc;
use tracing::debug;

/// Runtime-binary location override for the inference runtime
pub const ONNX_WASM_PATHS_VAR: &str = "ONNX_WASM_PATHS";
/// Base location for models and other auxiliary assets
pub const IMGLY_PUBLIC_PATH_VAR: &str = "IMGLY_PUBLIC_PATH";
/// Variable the dynamically loaded ONNX Runtime reads its library path from
pub const ORT_DYLIB_PATH_VAR: &str = "ORT_DYLIB_PATH";

/// Adapters shared by every stage of one process
#[derive(Clone)]
pub struct Services {
    codec: Arc<dyn ImageCodec>,
    sessions: SessionFactory,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("codec", &self.codec.name())
            .field("engine", &self.sessions.engine_name())
            .finish()
    }
}

impl Services {
    #[must_use]
    pub fn builder() -> ServicesBuilder {
        ServicesBuilder::default()
    }

    /// Services with every default adapter
    ///
    /// # Errors
    /// `BgRemovalError::InvalidConfig` when no engine feature is compiled in
    pub fn portable() -> Result<Self> {
        Self::builder().build()
    }

    #[must_use]
    pub fn codec(&self) -> &dyn ImageCodec {
        self.codec.as_ref()
    }

    #[must_use]
    pub fn session_factory(&self) -> &SessionFactory {
        &self.sessions
    }
}

/// Builder for [`Services`]; unset adapters fall back to the defaults
#[derive(Default)]
pub struct ServicesBuilder {
    codec: Option<Arc<dyn ImageCodec>>,
    engine: Option<Arc<dyn InferenceEngine>>,
    model_reader: Option<Arc<dyn ModelReader>>,
}

impl ServicesBuilder {
    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn InferenceEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn model_reader(mut self, reader: Arc<dyn ModelReader>) -> Self {
        self.model_reader = Some(reader);
        self
    }

    /// # Errors
    /// `BgRemovalError::InvalidConfig` when no engine was given and none is
    /// compiled in
    pub fn build(self) -> Result<Services> {
        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(ImageCrateCodec::new()));
        let engine = match self.engine {
            Some(engine) => engine,
            None => default_engine().ok_or_else(|| {
                BgRemovalError::invalid_config(
                    "no inference engine available; enable the `tract` or `onnx` feature",
                )
            })?,
        };
        let reader = self.model_reader.unwrap_or_else(|| Arc::new(FsModelReader));

        debug!(
            codec = codec.name(),
            engine = engine.name(),
            "Services composed"
        );

        Ok(Services {
            codec,
            sessions: SessionFactory::with_reader(engine, reader),
        })
    }
}

#[allow(unreachable_code)]
fn default_engine() -> Option<Arc<dyn InferenceEngine>> {
    #[cfg(feature = "tract")]
    return Some(Arc::new(crate::backends::TractEngine::new()));
    #[cfg(feature = "onnx")]
    return Some(Arc::new(crate::backends::OnnxEngine::new()));
    None
}

/// Process-level overrides read from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentOverrides {
    /// `ONNX_WASM_PATHS`: where the inference runtime binary lives
    pub runtime_paths: Option<String>,
    /// `IMGLY_PUBLIC_PATH`: base location for models
    pub public_path: Option<String>,
}

impl EnvironmentOverrides {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through `lookup`; blank values count as unset
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            runtime_paths: read(ONNX_WASM_PATHS_VAR),
            public_path: read(IMGLY_PUBLIC_PATH_VAR),
        }
    }

    /// Public path to resolve models against
    #[must_use]
    pub fn public_path(&self) -> String {
        self.public_path.clone().unwrap_or_else(default_public_path)
    }

    /// Value to export as `ORT_DYLIB_PATH`, given its current value
    ///
    /// An explicit `ORT_DYLIB_PATH` always wins.
    #[must_use]
    pub fn dylib_export(&self, existing: Option<&str>) -> Option<&str> {
        match existing {
            Some(current) if !current.trim().is_empty() => None,
            _ => self.runtime_paths.as_deref(),
        }
    }

    /// Export the runtime-binary override before any session exists
    pub fn apply(&self) {
        let existing = std::env::var(ORT_DYLIB_PATH_VAR).ok();
        if let Some(path) = self.dylib_export(existing.as_deref()) {
            debug!(%path, "Exporting {ORT_DYLIB_PATH_VAR} from {ONNX_WASM_PATHS_VAR}");
            std::env::set_var(ORT_DYLIB_PATH_VAR, path);
        }
    }
}
