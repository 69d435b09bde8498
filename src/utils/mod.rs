//! Utility modules shared by the removal pipeline

pub mod preprocessing;

pub use preprocessing::{
    CoordinateTransformation, ImagePreprocessor, Normalization, PreprocessedImage,
    PreprocessingOptions,
};
