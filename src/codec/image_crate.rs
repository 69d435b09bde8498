//! [`ImageCodec`] adapter over the pure-Rust `image` crate

use super::{ContainerFormat, EncodeOptions, ImageCodec, ImageMetadata, RawImage};
use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, ImageBuffer, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;

const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Software codec backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl ImageCrateCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn container_of(format: Option<ImageFormat>) -> Result<ContainerFormat> {
        match format {
            Some(ImageFormat::Png) => Ok(ContainerFormat::Png),
            Some(ImageFormat::Jpeg) => Ok(ContainerFormat::Jpeg),
            Some(ImageFormat::WebP) => Ok(ContainerFormat::WebP),
            Some(ImageFormat::Tiff) => Ok(ContainerFormat::Tiff),
            Some(other) => Err(BgRemovalError::decode(format!(
                "Unsupported image format: {other:?}"
            ))),
            None => Err(BgRemovalError::decode("Unrecognized image data")),
        }
    }

    fn to_dynamic(image: &RawImage) -> Result<DynamicImage> {
        let (width, height) = (image.width, image.height);
        let data = image.data.clone();
        let dynamic = match image.channels {
            1 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            2 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
            3 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
            4 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
            other => {
                return Err(BgRemovalError::encode(format!(
                    "Unsupported channel count: {other}"
                )))
            },
        };

        dynamic.ok_or_else(|| {
            BgRemovalError::encode(format!(
                "Pixel buffer of {} bytes is too small for {width}x{height}x{}",
                image.data.len(),
                image.channels
            ))
        })
    }
}

impl ImageCodec for ImageCrateCodec {
    fn name(&self) -> &'static str {
        "image-rs"
    }

    fn inspect(&self, bytes: &[u8]) -> Result<ImageMetadata> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BgRemovalError::decode(format!("Failed to read image header: {e}")))?;
        let format = Self::container_of(reader.format())?;

        let decoder = reader
            .into_decoder()
            .map_err(|e| BgRemovalError::decode(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        let color = decoder.color_type();

        Ok(ImageMetadata {
            width,
            height,
            channels: color.channel_count(),
            format,
            space: "srgb",
            has_alpha: color.has_alpha(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<RawImage> {
        Self::container_of(image::guess_format(bytes).ok())?;

        let image = image::load_from_memory(bytes)
            .map_err(|e| BgRemovalError::decode(e.to_string()))?;
        let (width, height) = (image.width(), image.height());

        Ok(if image.color().has_alpha() {
            RawImage {
                width,
                height,
                channels: 4,
                data: image.to_rgba8().into_raw(),
            }
        } else {
            RawImage {
                width,
                height,
                channels: 3,
                data: image.to_rgb8().into_raw(),
            }
        })
    }

    fn encode(
        &self,
        image: &RawImage,
        format: ContainerFormat,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>> {
        let dynamic = Self::to_dynamic(image)?;
        let mut buffer = Vec::new();

        match format {
            ContainerFormat::Png => dynamic
                .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                .map_err(|e| BgRemovalError::encode(format!("Failed to encode PNG: {e}")))?,
            ContainerFormat::Jpeg => {
                // JPEG has no alpha channel
                let opaque = if image.channels <= 2 {
                    DynamicImage::ImageLuma8(dynamic.to_luma8())
                } else {
                    DynamicImage::ImageRgb8(dynamic.to_rgb8())
                };
                let quality = options.quality_percent(DEFAULT_JPEG_QUALITY);
                let encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
                opaque
                    .write_with_encoder(encoder)
                    .map_err(|e| BgRemovalError::encode(format!("Failed to encode JPEG: {e}")))?;
            },
            #[cfg(feature = "webp-support")]
            ContainerFormat::WebP => {
                let converted = if image.has_alpha() {
                    DynamicImage::ImageRgba8(dynamic.to_rgba8())
                } else {
                    DynamicImage::ImageRgb8(dynamic.to_rgb8())
                };
                let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut buffer);
                converted
                    .write_with_encoder(encoder)
                    .map_err(|e| BgRemovalError::encode(format!("Failed to encode WebP: {e}")))?;
            },
            other => {
                return Err(BgRemovalError::encode(format!(
                    "{} cannot encode {other}",
                    self.name()
                )))
            },
        }

        Ok(buffer)
    }

    fn resolve_format(&self, name: &str) -> Option<ContainerFormat> {
        match name.to_ascii_lowercase().as_str() {
            "png" | "image/png" => Some(ContainerFormat::Png),
            "jpeg" | "jpg" | "image/jpeg" => Some(ContainerFormat::Jpeg),
            #[cfg(feature = "webp-support")]
            "webp" | "image/webp" => Some(ContainerFormat::WebP),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard_rgba(size: u32) -> RawImage {
        let mut data = Vec::new();
        for y in 0..size {
            for x in 0..size {
                let on = (x + y) % 2 == 0;
                data.extend_from_slice(if on { &[255, 0, 0, 255] } else { &[0, 0, 255, 0] });
            }
        }
        RawImage {
            width: size,
            height: size,
            channels: 4,
            data,
        }
    }

    #[test]
    fn test_png_preserves_alpha() {
        let codec = ImageCrateCodec::new();
        let image = checkerboard_rgba(6);
        let png = codec
            .encode(&image, ContainerFormat::Png, &EncodeOptions::default())
            .unwrap();

        let metadata = codec.inspect(&png).unwrap();
        assert_eq!(metadata.format, ContainerFormat::Png);
        assert!(metadata.has_alpha);
        assert_eq!(metadata.channels, 4);

        let decoded = codec.decode(&png).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let codec = ImageCrateCodec::new();
        let jpeg = codec
            .encode(
                &checkerboard_rgba(8),
                ContainerFormat::Jpeg,
                &EncodeOptions::with_quality(0.9),
            )
            .unwrap();

        assert!(jpeg.starts_with(&[0xFF, 0xD8]));
        let metadata = codec.inspect(&jpeg).unwrap();
        assert_eq!(metadata.format, ContainerFormat::Jpeg);
        assert!(!metadata.has_alpha);

        let decoded = codec.decode(&jpeg).unwrap();
        assert_eq!(decoded.channels, 3);
    }

    #[test]
    fn test_lower_quality_produces_smaller_jpeg() {
        let codec = ImageCrateCodec::new();
        let mut data = Vec::new();
        for i in 0..(64 * 64) {
            data.extend_from_slice(&[(i * 7 % 256) as u8, (i * 13 % 256) as u8, (i % 256) as u8]);
        }
        let image = RawImage {
            width: 64,
            height: 64,
            channels: 3,
            data,
        };

        let high = codec
            .encode(&image, ContainerFormat::Jpeg, &EncodeOptions::with_quality(1.0))
            .unwrap();
        let low = codec
            .encode(&image, ContainerFormat::Jpeg, &EncodeOptions::with_quality(0.1))
            .unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_resolve_format() {
        let codec = ImageCrateCodec::new();
        assert_eq!(codec.resolve_format("PNG"), Some(ContainerFormat::Png));
        assert_eq!(codec.resolve_format("jpg"), Some(ContainerFormat::Jpeg));
        assert_eq!(codec.resolve_format("image/jpeg"), Some(ContainerFormat::Jpeg));
        assert_eq!(codec.resolve_format("gif"), None);
        assert_eq!(codec.resolve_format("tiff"), None);
        assert_eq!(codec.fallback_format(), ContainerFormat::Png);
    }

    #[cfg(feature = "webp-support")]
    #[test]
    fn test_webp_encode() {
        let codec = ImageCrateCodec::new();
        let webp = codec
            .encode(&checkerboard_rgba(4), ContainerFormat::WebP, &EncodeOptions::default())
            .unwrap();
        let metadata = codec.inspect(&webp).unwrap();
        assert_eq!(metadata.format, ContainerFormat::WebP);
        assert_eq!((metadata.width, metadata.height), (4, 4));
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        let codec = ImageCrateCodec::new();
        let image = RawImage {
            width: 10,
            height: 10,
            channels: 4,
            data: vec![0; 12],
        };
        let err = codec
            .encode(&image, ContainerFormat::Png, &EncodeOptions::default())
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::Encode(_)));
    }

    #[test]
    fn test_decode_rejects_truncated_png() {
        let codec = ImageCrateCodec::new();
        let truncated = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        assert!(matches!(
            codec.decode(&truncated),
            Err(BgRemovalError::Decode(_))
        ));
    }
}
