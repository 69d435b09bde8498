//! Result types of the removal pipeline

use crate::config::{OutputFormat, RemovalMode};
use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};

/// Encoded result of one background removal
#[derive(Debug, Clone)]
pub struct RemovalOutput {
    /// Encoded image bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Container the bytes are actually encoded in
    pub format: OutputFormat,
    pub mode: RemovalMode,
    /// Foreground/background split of the mask
    pub mask_statistics: MaskStatistics,
    pub timings: ProcessingTimings,
}

impl RemovalOutput {
    /// Encoded size in kilobytes
    #[must_use]
    pub fn size_kb(&self) -> f64 {
        self.bytes.len() as f64 / 1024.0
    }
}

/// Per-pixel foreground probability scaled to 0..=255
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255), row-major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// # Errors
    /// `BgRemovalError::Processing` when `data` does not hold exactly
    /// `width * height` values
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgRemovalError::processing(format!(
                "Mask has {} values, expected {expected} for {}x{}",
                data.len(),
                dimensions.0,
                dimensions.1
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let background_pixels = total_pixels - foreground_pixels;
        let ratio = |n: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                n as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: ratio(foreground_pixels),
            background_ratio: ratio(background_pixels),
        }
    }
}

/// Statistics about a segmentation mask
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// Detailed timing breakdown for background removal processing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Decoding the input bytes into pixels
    pub decode_ms: u64,

    /// Model loading and session creation (zero once initialized)
    pub model_load_ms: u64,

    /// Resize, padding and tensor conversion
    pub preprocess_ms: u64,

    pub inference_ms: u64,

    /// Mask extraction and compositing
    pub postprocess_ms: u64,

    pub encode_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Share of the total spent in inference
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// Time not attributed to any measured stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.decode_ms
            + self.model_load_ms
            + self.preprocess_ms
            + self.inference_ms
            + self.postprocess_ms
            + self.encode_ms;
        self.total_ms.saturating_sub(measured)
    }
}
