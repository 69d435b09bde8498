//! Inference engine implementations
//!
//! - Tract (pure Rust, no external dependencies)
//! - ONNX Runtime (hardware acceleration through execution providers)
//! - Mock (deterministic masks for tests, behind `test-utils`)

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(any(test, feature = "test-utils"))]
pub use self::mock::MockEngine;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxEngine;

#[cfg(feature = "tract")]
pub use self::tract::TractEngine;
