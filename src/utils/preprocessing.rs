//! Image preprocessing for model inference
//!
//! The image is resized with its aspect ratio preserved, centred on a square
//! canvas and converted to a normalised NCHW tensor. The same
//! [`CoordinateTransformation`] is later used to map the model output back
//! onto the original pixels.

use crate::{
    codec::RawImage,
    error::{BgRemovalError, Result},
};
use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;

/// Per-channel normalisation applied as `(v / 255 - mean) / std`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    /// `ISNet` normalisation
    fn default() -> Self {
        Self {
            mean: [0.5, 0.5, 0.5],
            std: [1.0, 1.0, 1.0],
        }
    }
}

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Padding color for aspect ratio preservation (RGB)
    pub padding_color: [u8; 3],
    pub normalization: Normalization,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            padding_color: [255, 255, 255],
            normalization: Normalization::default(),
        }
    }
}

/// Placement of the resized image on the square model canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransformation {
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub target_size: u32,
}

impl CoordinateTransformation {
    /// Fit `original` (width, height) into a `target_size` square
    ///
    /// # Errors
    /// `BgRemovalError::Processing` for empty images or a zero target
    pub fn fit(original: (u32, u32), target_size: u32) -> Result<Self> {
        let (orig_width, orig_height) = original;
        if orig_width == 0 || orig_height == 0 || target_size == 0 {
            return Err(BgRemovalError::processing(format!(
                "Cannot fit {orig_width}x{orig_height} image into {target_size}x{target_size}"
            )));
        }

        let target = target_size as f32;
        let scale = (target / orig_width as f32).min(target / orig_height as f32);

        let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            scale,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            target_size,
        })
    }

    /// Canvas coordinate of an original pixel, if it lands on the canvas
    ///
    /// Rounding never pushes a pixel past the resized region.
    #[must_use]
    pub fn to_canvas(&self, x: u32, y: u32) -> Option<(usize, usize)> {
        let scaled_x = ((x as f32 * self.scale).round() as u32).min(self.scaled_width - 1);
        let scaled_y = ((y as f32 * self.scale).round() as u32).min(self.scaled_height - 1);
        let canvas_x = scaled_x + self.offset_x;
        let canvas_y = scaled_y + self.offset_y;
        (canvas_x < self.target_size && canvas_y < self.target_size)
            .then_some((canvas_x as usize, canvas_y as usize))
    }
}

/// Output of [`ImagePreprocessor::preprocess`]
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub tensor: Array4<f32>,
    pub transformation: CoordinateTransformation,
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Build the `[1, 3, S, S]` input tensor for `image`
    ///
    /// Alpha is ignored; only the colour channels reach the model.
    ///
    /// # Errors
    /// `BgRemovalError::Processing` for empty images, unsupported channel
    /// counts or truncated pixel buffers
    pub fn preprocess(
        image: &RawImage,
        target_size: u32,
        options: &PreprocessingOptions,
    ) -> Result<PreprocessedImage> {
        let rgb_image = Self::to_rgb(image)?;
        let transformation =
            CoordinateTransformation::fit(rgb_image.dimensions(), target_size)?;

        let resized = image::imageops::resize(
            &rgb_image,
            transformation.scaled_width,
            transformation.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let mut canvas =
            ImageBuffer::from_pixel(target_size, target_size, Rgb(options.padding_color));
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(transformation.offset_x),
            i64::from(transformation.offset_y),
        );

        let tensor = Self::canvas_to_tensor(&canvas, &options.normalization, target_size as usize);

        Ok(PreprocessedImage {
            tensor,
            transformation,
        })
    }

    fn to_rgb(image: &RawImage) -> Result<RgbImage> {
        let channels = usize::from(image.channels);
        let pixel_count = image.width as usize * image.height as usize;
        if image.data.len() < pixel_count * channels {
            return Err(BgRemovalError::processing(format!(
                "Pixel buffer of {} bytes is too small for {}x{}x{channels}",
                image.data.len(),
                image.width,
                image.height
            )));
        }

        let data: Vec<u8> = match channels {
            3 => image.data.iter().take(pixel_count * 3).copied().collect(),
            4 => image
                .data
                .chunks_exact(4)
                .take(pixel_count)
                .flat_map(|px| px.iter().take(3).copied())
                .collect(),
            1 | 2 => image
                .data
                .chunks_exact(channels)
                .take(pixel_count)
                .flat_map(|px| {
                    let luma = px.first().copied().unwrap_or(0);
                    [luma, luma, luma]
                })
                .collect(),
            other => {
                return Err(BgRemovalError::processing(format!(
                    "Unsupported channel count: {other}"
                )))
            },
        };

        ImageBuffer::from_raw(image.width, image.height, data)
            .ok_or_else(|| BgRemovalError::processing("Failed to build RGB image from pixels"))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(
        canvas: &RgbImage,
        normalization: &Normalization,
        target_size: usize,
    ) -> Array4<f32> {
        let mut tensor = Array4::<f32>::zeros((1, 3, target_size, target_size));

        #[allow(clippy::indexing_slicing)]
        // tensor dimensions match the canvas
        for (x, y, pixel) in canvas.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (f32::from(pixel[c]) / 255.0 - normalization.mean[c])
                    / normalization.std[c];
            }
        }

        tensor
    }
}
