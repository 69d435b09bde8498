//! ONNX Runtime engine
//!
//! Native alternative to the Tract engine. Hardware execution providers are
//! registered when available (CUDA, then CoreML) and CPU is the fallback.
//! With the `onnx-dynamic` feature the runtime library is located through
//! `ORT_DYLIB_PATH`, which `ONNX_WASM_PATHS` populates at startup.

use crate::config::SessionOptions;
use crate::error::{BgRemovalError, Result};
use crate::inference::{InferenceEngine, InferenceSession, ISNET_INPUT_SIZE};
use instant::Instant;
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{
    builder::{GraphOptimizationLevel, SessionBuilder},
    Session,
};
use ort::value::Value;

/// Engine creating ONNX Runtime sessions
#[derive(Debug, Clone, Copy)]
pub struct OnnxEngine {
    input_size: u32,
    use_hardware_providers: bool,
}

impl OnnxEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            input_size: ISNET_INPUT_SIZE,
            use_hardware_providers: true,
        }
    }

    /// Restrict the engine to the CPU execution provider
    #[must_use]
    pub fn cpu_only(mut self) -> Self {
        self.use_hardware_providers = false;
        self
    }

    #[must_use]
    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    fn builder(&self, options: &SessionOptions) -> Result<SessionBuilder> {
        let mut builder = Session::builder().map_err(|e| {
            BgRemovalError::session_create(format!("Failed to create session builder: {e}"))
        })?;

        if options.optimize {
            builder = builder
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| {
                    BgRemovalError::session_create(format!(
                        "Failed to set optimization level: {e}"
                    ))
                })?;
        }

        if self.use_hardware_providers {
            let mut providers = Vec::new();

            let cuda = CUDAExecutionProvider::default();
            if OrtExecutionProvider::is_available(&cuda).unwrap_or(false) {
                log::info!("CUDA execution provider is available and will be used");
                providers.push(cuda.build());
            }

            let coreml = CoreMLExecutionProvider::default();
            if OrtExecutionProvider::is_available(&coreml).unwrap_or(false) {
                log::info!("CoreML execution provider is available and will be used");
                providers.push(coreml.with_subgraphs(true).build());
            }

            if providers.is_empty() {
                log::debug!("No hardware execution provider available, using CPU");
            } else {
                builder = builder.with_execution_providers(providers).map_err(|e| {
                    BgRemovalError::session_create(format!(
                        "Failed to register execution providers: {e}"
                    ))
                })?;
            }
        }

        builder
            .with_intra_threads(options.num_threads.max(1))
            .map_err(|e| BgRemovalError::session_create(format!("Failed to set intra threads: {e}")))
    }

    fn wrap(&self, session: Session, start: Instant) -> Box<dyn InferenceSession> {
        log::info!(
            "ONNX Runtime session ready in {:.0}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Box::new(OnnxSession {
            session,
            input_size: self.input_size,
        })
    }
}

impl Default for OnnxEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for OnnxEngine {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn create_session(
        &self,
        model: &[u8],
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        let start = Instant::now();
        let session = self
            .builder(options)?
            .commit_from_memory(model)
            .map_err(|e| {
                BgRemovalError::session_create(format!(
                    "Failed to create session from model data: {e}"
                ))
            })?;
        Ok(self.wrap(session, start))
    }

    fn create_session_from_location(
        &self,
        location: &str,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        let start = Instant::now();
        let session = self
            .builder(options)?
            .commit_from_file(location)
            .map_err(|e| {
                BgRemovalError::session_create(format!(
                    "Failed to create session from {location}: {e}"
                ))
            })?;
        Ok(self.wrap(session, start))
    }
}

struct OnnxSession {
    session: Session,
    input_size: u32,
}

impl InferenceSession for OnnxSession {
    fn run(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        // Positional access: the first output is the mask regardless of its name
        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| BgRemovalError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    BgRemovalError::inference(format!("Failed to extract output tensor: {e}"))
                })?
        };

        let output_shape = output_tensor.shape();
        if output_shape.len() != 4 {
            return Err(BgRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        }

        let output_array = Array4::from_shape_vec(
            (
                output_shape.first().copied().unwrap_or(1),
                output_shape.get(1).copied().unwrap_or(1),
                output_shape.get(2).copied().unwrap_or(1),
                output_shape.get(3).copied().unwrap_or(1),
            ),
            output_tensor.iter().copied().collect(),
        )
        .map_err(|e| BgRemovalError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "ONNX inference completed in {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(output_array)
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }
}
