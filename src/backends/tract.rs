//! Tract engine: pure-Rust ONNX inference
//!
//! This is the portable default. It needs no native runtime library, so the
//! binary runs anywhere it compiles. Tract manages its own threading and
//! ignores `SessionOptions::num_threads`.

use crate::config::SessionOptions;
use crate::error::{BgRemovalError, Result};
use crate::inference::{InferenceEngine, InferenceSession, ISNET_INPUT_SIZE};
use instant::Instant;
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Engine creating Tract sessions
#[derive(Debug, Clone, Copy)]
pub struct TractEngine {
    input_size: u32,
}

impl TractEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            input_size: ISNET_INPUT_SIZE,
        }
    }

    /// Engine for models with a different square input size
    #[must_use]
    pub fn with_input_size(input_size: u32) -> Self {
        Self { input_size }
    }

    fn prepare(
        &self,
        model: InferenceModel,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        let start = Instant::now();
        let size = self.input_size as usize;

        if options.num_threads > 1 {
            log::debug!(
                "Tract ignores num_threads={}; using its own scheduling",
                options.num_threads
            );
        }

        let model = model
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| BgRemovalError::session_create(format!("Failed to pin input shape: {e}")))?;

        let typed = if options.optimize {
            model.into_optimized()
        } else {
            model.into_typed()
        }
        .map_err(|e| BgRemovalError::session_create(format!("Failed to optimize model: {e}")))?;

        let runnable = typed.into_runnable().map_err(|e| {
            BgRemovalError::session_create(format!("Failed to create runnable model: {e}"))
        })?;

        log::info!(
            "Tract session ready in {:.0}ms (input {size}x{size}, optimized: {})",
            start.elapsed().as_secs_f64() * 1000.0,
            options.optimize
        );

        Ok(Box::new(TractSession {
            model: runnable,
            input_size: self.input_size,
        }))
    }
}

impl Default for TractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn create_session(
        &self,
        model: &[u8],
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        log::debug!("Creating Tract model from {} bytes of ONNX data", model.len());

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model))
            .map_err(|e| BgRemovalError::session_create(format!("Failed to load ONNX model: {e}")))?;

        self.prepare(model, options)
    }

    fn create_session_from_location(
        &self,
        location: &str,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        log::debug!("Creating Tract model from location {location}");

        let model = onnx().model_for_path(location).map_err(|e| {
            BgRemovalError::session_create(format!("Failed to load ONNX model from {location}: {e}"))
        })?;

        self.prepare(model, options)
    }
}

struct TractSession {
    model: TractModel,
    input_size: u32,
}

impl InferenceSession for TractSession {
    #[allow(clippy::get_first)]
    fn run(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        log::debug!("Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());

        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let output_shape = output_data.shape();
        if output_shape.len() != 4 {
            return Err(BgRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        }

        let size = self.input_size as usize;
        let output_array = Array4::from_shape_vec(
            (
                output_shape.get(0).copied().unwrap_or(1),
                output_shape.get(1).copied().unwrap_or(1),
                output_shape.get(2).copied().unwrap_or(size),
                output_shape.get(3).copied().unwrap_or(size),
            ),
            output_data.iter().copied().collect(),
        )
        .map_err(|e| {
            BgRemovalError::inference(format!("Failed to reshape output tensor: {e}"))
        })?;

        log::debug!(
            "Tract inference completed in {:.2}ms, output {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            output_array.shape()
        );

        Ok(output_array)
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }
}
