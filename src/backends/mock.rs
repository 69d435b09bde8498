//! Mock engine for tests
//!
//! Produces a deterministic segmentation mask without loading a model, and
//! records every session-creation call so tests can check how model
//! references reached the engine.

use crate::config::SessionOptions;
use crate::error::{BgRemovalError, Result};
use crate::inference::{InferenceEngine, InferenceSession};
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Mask the mock session emits
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockMask {
    /// Foreground is the centred square covering the middle half of each axis
    CenterSquare,
    /// Every pixel has the same foreground probability
    Constant(f32),
}

/// A recorded session-creation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEngineCall {
    /// `create_session` with a buffer of this many bytes
    FromBuffer(usize),
    /// `create_session_from_location` with this location
    FromLocation(String),
}

/// Engine that never touches a real runtime
#[derive(Debug, Clone)]
pub struct MockEngine {
    input_size: u32,
    mask: MockMask,
    reject_models: bool,
    calls: Arc<Mutex<Vec<MockEngineCall>>>,
}

impl MockEngine {
    pub const DEFAULT_INPUT_SIZE: u32 = 64;

    #[must_use]
    pub fn new() -> Self {
        Self {
            input_size: Self::DEFAULT_INPUT_SIZE,
            mask: MockMask::CenterSquare,
            reject_models: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Engine whose session creation always fails
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            reject_models: true,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn with_mask(mut self, mask: MockMask) -> Self {
        self.mask = mask;
        self
    }

    #[must_use]
    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size.max(1);
        self
    }

    /// Session-creation calls seen so far
    #[must_use]
    pub fn calls(&self) -> Vec<MockEngineCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: MockEngineCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn session(&self) -> Result<Box<dyn InferenceSession>> {
        if self.reject_models {
            return Err(BgRemovalError::session_create(
                "mock engine rejected the model",
            ));
        }
        Ok(Box::new(MockSession {
            input_size: self.input_size,
            mask: self.mask,
        }))
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create_session(
        &self,
        model: &[u8],
        _options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        self.record(MockEngineCall::FromBuffer(model.len()));
        self.session()
    }

    fn create_session_from_location(
        &self,
        location: &str,
        _options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        self.record(MockEngineCall::FromLocation(location.to_string()));
        self.session()
    }
}

struct MockSession {
    input_size: u32,
    mask: MockMask,
}

impl InferenceSession for MockSession {
    fn run(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let size = self.input_size as usize;
        let (n, c, h, w) = input.dim();
        if (n, c, h, w) != (1, 3, size, size) {
            return Err(BgRemovalError::inference(format!(
                "Mock session expects [1, 3, {size}, {size}], got {:?}",
                input.shape()
            )));
        }

        let output = match self.mask {
            MockMask::Constant(value) => Array4::<f32>::from_elem((1, 1, size, size), value),
            MockMask::CenterSquare => {
                let (lo, hi) = (size / 4, size - size / 4);
                Array4::<f32>::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
                    if (lo..hi).contains(&y) && (lo..hi).contains(&x) {
                        1.0
                    } else {
                        0.0
                    }
                })
            },
        };

        Ok(output)
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }
}
