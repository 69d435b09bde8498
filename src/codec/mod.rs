//! Image codec abstraction
//!
//! The removal pipeline never talks to an image library directly. It goes
//! through [`ImageCodec`], which declares exactly the operations the
//! pipeline needs, and through [`ImageHandle`], a builder that records a
//! small fixed set of typed options and applies them in one pass when
//! [`ImageHandle::produce`] is called.
//!
//! ```rust
//! use bg_remover::codec::{EncodeOptions, ImageCrateCodec, ImageHandle, RawLayout};
//!
//! # fn main() -> bg_remover::Result<()> {
//! let codec = ImageCrateCodec::new();
//! let layout = RawLayout::new(2, 2, 4);
//! let pixels = vec![255u8; layout.byte_len()];
//!
//! let png = ImageHandle::from_raw(&codec, &pixels, layout)?
//!     .to_format("png", EncodeOptions::default())
//!     .produce()?;
//!
//! let metadata = ImageHandle::new(&codec, &png).inspect()?;
//! assert_eq!((metadata.width, metadata.height), (2, 2));
//! assert!(metadata.has_alpha);
//! # Ok(())
//! # }
//! ```

mod image_crate;

pub use image_crate::ImageCrateCodec;

use crate::error::{BgRemovalError, Result};
use serde::Serialize;
use tracing::{debug, warn};

/// Image container formats known to the codec layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Png,
    Jpeg,
    WebP,
    Tiff,
    /// Uncompressed interleaved pixels with a declared layout
    Raw,
}

impl ContainerFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::WebP => "webp",
            Self::Tiff => "tiff",
            Self::Raw => "raw",
        }
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`ImageHandle::inspect`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    /// Number of interleaved channels (1-4)
    pub channels: u8,
    pub format: ContainerFormat,
    /// Colour space, always `srgb` for the supported 8-bit formats
    pub space: &'static str,
    pub has_alpha: bool,
}

/// Declared shape of a raw pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RawLayout {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl RawLayout {
    #[must_use]
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Number of bytes a buffer with this layout occupies
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * usize::from(self.channels)
    }

    fn validate(&self) -> Result<()> {
        if (1..=4).contains(&self.channels) {
            Ok(())
        } else {
            Err(BgRemovalError::config_value_error(
                "channel count",
                self.channels,
                "1-4",
                Some(4),
            ))
        }
    }
}

/// Decoded 8-bit image: row-major, interleaved channels, no row padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl RawImage {
    #[must_use]
    pub fn layout(&self) -> RawLayout {
        RawLayout::new(self.width, self.height, self.channels)
    }

    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.channels == 2 || self.channels == 4
    }

    /// Return the image with an opaque alpha channel appended if it has none
    #[must_use]
    pub fn with_alpha(self) -> Self {
        if self.has_alpha() {
            return self;
        }

        let channels = usize::from(self.channels);
        let mut data = Vec::with_capacity(self.data.len() / channels * (channels + 1));
        for pixel in self.data.chunks_exact(channels) {
            data.extend_from_slice(pixel);
            data.push(u8::MAX);
        }

        Self {
            width: self.width,
            height: self.height,
            channels: self.channels + 1,
            data,
        }
    }
}

/// Encoder options recorded by [`ImageHandle::to_format`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EncodeOptions {
    /// Quality for lossy formats: 0.0-1.0, or a 1-100 percentage.
    /// `None` or `0.0` selects the encoder default.
    pub quality: Option<f32>,
}

impl EncodeOptions {
    #[must_use]
    pub fn with_quality(quality: f32) -> Self {
        Self {
            quality: Some(quality),
        }
    }

    /// Quality mapped to the 1-100 scale used by lossy encoders
    #[must_use]
    pub fn quality_percent(&self, default: u8) -> u8 {
        match self.quality {
            Some(q) if q.is_finite() && q > 0.0 => {
                let percent = if q <= 1.0 { q * 100.0 } else { q };
                percent.round().clamp(1.0, 100.0) as u8
            },
            _ => default,
        }
    }
}

/// Operations the removal pipeline needs from an image library
pub trait ImageCodec: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Read dimensions and pixel format without keeping the decoded pixels
    ///
    /// # Errors
    /// `BgRemovalError::Decode` when the bytes are not a supported image
    fn inspect(&self, bytes: &[u8]) -> Result<ImageMetadata>;

    /// Decode to 8-bit RGB or RGBA depending on the source alpha
    ///
    /// # Errors
    /// `BgRemovalError::Decode` when the bytes are not a supported image
    fn decode(&self, bytes: &[u8]) -> Result<RawImage>;

    /// Encode raw pixels into a container format
    ///
    /// # Errors
    /// `BgRemovalError::Encode` when the encoder fails
    fn encode(
        &self,
        image: &RawImage,
        format: ContainerFormat,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>>;

    /// Map a format name to an encodable container, `None` if unsupported
    fn resolve_format(&self, name: &str) -> Option<ContainerFormat>;

    /// Lossless format used when no or an unsupported target is requested
    fn fallback_format(&self) -> ContainerFormat {
        ContainerFormat::Png
    }
}

enum Source<'a> {
    Encoded(&'a [u8]),
    Raw(RawImage),
}

/// Deferred image operation builder
///
/// Nothing is decoded or encoded until [`produce`](Self::produce) (or
/// [`into_raw_image`](Self::into_raw_image)). The input buffer is only read.
pub struct ImageHandle<'a> {
    codec: &'a dyn ImageCodec,
    source: Source<'a>,
    ensure_alpha: bool,
    raw: bool,
    target: Option<(String, EncodeOptions)>,
}

impl<'a> ImageHandle<'a> {
    /// Handle over an encoded image (PNG, JPEG, ...)
    #[must_use]
    pub fn new(codec: &'a dyn ImageCodec, input: &'a [u8]) -> Self {
        Self {
            codec,
            source: Source::Encoded(input),
            ensure_alpha: false,
            raw: false,
            target: None,
        }
    }

    /// Handle over raw pixels with a declared layout
    ///
    /// The first `min(input.len(), layout.byte_len())` bytes are copied into
    /// a fresh zeroed buffer of exactly `layout.byte_len()` bytes. The input
    /// length is not checked against the layout: short input leaves the tail
    /// black and transparent, excess input is ignored.
    ///
    /// # Errors
    /// `BgRemovalError::InvalidConfig` if `layout.channels` is not 1-4
    pub fn from_raw(codec: &'a dyn ImageCodec, input: &[u8], layout: RawLayout) -> Result<Self> {
        layout.validate()?;

        let expected = layout.byte_len();
        if input.len() != expected {
            debug!(
                supplied = input.len(),
                expected, "Raw buffer length differs from declared layout"
            );
        }

        let mut data = vec![0u8; expected];
        let copied = input.len().min(expected);
        if let (Some(dst), Some(src)) = (data.get_mut(..copied), input.get(..copied)) {
            dst.copy_from_slice(src);
        }

        Ok(Self {
            codec,
            source: Source::Raw(RawImage {
                width: layout.width,
                height: layout.height,
                channels: layout.channels,
                data,
            }),
            ensure_alpha: false,
            raw: false,
            target: None,
        })
    }

    /// Report dimensions and pixel format of the source
    ///
    /// # Errors
    /// `BgRemovalError::Decode` for unsupported encoded input
    pub fn inspect(&self) -> Result<ImageMetadata> {
        match &self.source {
            Source::Encoded(bytes) => self.codec.inspect(bytes),
            Source::Raw(image) => Ok(ImageMetadata {
                width: image.width,
                height: image.height,
                channels: image.channels,
                format: ContainerFormat::Raw,
                space: "srgb",
                has_alpha: image.has_alpha(),
            }),
        }
    }

    /// Output will carry an alpha channel
    #[must_use]
    pub fn ensure_alpha(mut self) -> Self {
        self.ensure_alpha = true;
        self
    }

    /// `produce` yields raw interleaved pixels instead of an encoded image
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Desired output container and options; a later call replaces an earlier one
    #[must_use]
    pub fn to_format<S: Into<String>>(mut self, format: S, options: EncodeOptions) -> Self {
        self.target = Some((format.into(), options));
        self
    }

    /// Decode the source and apply pixel-level options, keeping the layout
    ///
    /// # Errors
    /// `BgRemovalError::Decode` for unsupported encoded input
    pub fn into_raw_image(self) -> Result<RawImage> {
        let image = match self.source {
            Source::Encoded(bytes) => self.codec.decode(bytes)?,
            Source::Raw(image) => image,
        };

        Ok(if self.ensure_alpha {
            image.with_alpha()
        } else {
            image
        })
    }

    /// Apply the recorded operations in one pass
    ///
    /// Order: decode, ensure alpha, then either emit raw pixels or encode
    /// with the last requested format. With no format requested, or with a
    /// format the codec cannot encode, the codec's lossless fallback (PNG)
    /// is used; an unsupported format is logged, not returned as an error.
    ///
    /// # Errors
    /// - `BgRemovalError::Decode` for unsupported encoded input
    /// - `BgRemovalError::Encode` if the encoder itself fails
    pub fn produce(self) -> Result<Vec<u8>> {
        let codec = self.codec;
        let raw = self.raw;
        let target = self.target.clone();
        let image = self.into_raw_image()?;

        if raw {
            return Ok(image.data);
        }

        let (format, options) = match target {
            Some((name, options)) => match codec.resolve_format(&name) {
                Some(format) => (format, options),
                None => {
                    let fallback = codec.fallback_format();
                    warn!(
                        requested = %name,
                        fallback = %fallback,
                        codec = codec.name(),
                        "Unsupported output format, encoding with lossless fallback"
                    );
                    (fallback, options)
                },
            },
            None => (codec.fallback_format(), EncodeOptions::default()),
        };

        codec.encode(&image, format, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_gradient(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 10) as u8, (y * 10) as u8, 128]);
            }
        }
        data
    }

    #[test]
    fn test_with_alpha_appends_opaque_channel() {
        let image = RawImage {
            width: 2,
            height: 1,
            channels: 3,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        let rgba = image.with_alpha();
        assert_eq!(rgba.channels, 4);
        assert_eq!(rgba.data, vec![1, 2, 3, 255, 4, 5, 6, 255]);

        let again = rgba.clone().with_alpha();
        assert_eq!(again, rgba);
    }

    #[test]
    fn test_quality_percent_mapping() {
        assert_eq!(EncodeOptions::default().quality_percent(90), 90);
        assert_eq!(EncodeOptions::with_quality(0.0).quality_percent(90), 90);
        assert_eq!(EncodeOptions::with_quality(0.5).quality_percent(90), 50);
        assert_eq!(EncodeOptions::with_quality(1.0).quality_percent(90), 100);
        assert_eq!(EncodeOptions::with_quality(0.001).quality_percent(90), 1);
        assert_eq!(EncodeOptions::with_quality(75.0).quality_percent(90), 75);
        assert_eq!(EncodeOptions::with_quality(500.0).quality_percent(90), 100);
    }

    #[test]
    fn test_from_raw_rejects_bad_channel_count() {
        let codec = ImageCrateCodec::new();
        assert!(ImageHandle::from_raw(&codec, &[0; 10], RawLayout::new(1, 2, 5)).is_err());
        assert!(ImageHandle::from_raw(&codec, &[], RawLayout::new(1, 1, 0)).is_err());
    }

    #[test]
    fn test_from_raw_exact_layout_returns_same_bytes() {
        let codec = ImageCrateCodec::new();
        let bytes = rgb_gradient(5, 4);
        let raw = ImageHandle::from_raw(&codec, &bytes, RawLayout::new(5, 4, 3))
            .unwrap()
            .raw()
            .produce()
            .unwrap();
        assert_eq!(raw, bytes);

        let rgba: Vec<u8> = (0..3 * 2 * 4).map(|i| (i * 7) as u8).collect();
        let raw = ImageHandle::from_raw(&codec, &rgba, RawLayout::new(3, 2, 4))
            .unwrap()
            .raw()
            .produce()
            .unwrap();
        assert_eq!(raw, rgba);
    }

    #[test]
    fn test_from_raw_short_input_is_zero_filled() {
        let codec = ImageCrateCodec::new();
        let raw = ImageHandle::from_raw(&codec, &[9, 9, 9], RawLayout::new(2, 1, 3))
            .unwrap()
            .raw()
            .produce()
            .unwrap();
        assert_eq!(raw, vec![9, 9, 9, 0, 0, 0]);
    }

    #[test]
    fn test_from_raw_excess_input_is_ignored() {
        let codec = ImageCrateCodec::new();
        let raw = ImageHandle::from_raw(&codec, &[1, 2, 3, 4, 5], RawLayout::new(1, 1, 3))
            .unwrap()
            .raw()
            .produce()
            .unwrap();
        assert_eq!(raw, vec![1, 2, 3]);
    }

    #[test]
    fn test_raw_source_inspect_reports_declared_layout() {
        let codec = ImageCrateCodec::new();
        let handle = ImageHandle::from_raw(&codec, &[0; 24], RawLayout::new(3, 2, 4)).unwrap();
        let metadata = handle.inspect().unwrap();
        assert_eq!(metadata.width, 3);
        assert_eq!(metadata.height, 2);
        assert_eq!(metadata.channels, 4);
        assert_eq!(metadata.format, ContainerFormat::Raw);
        assert!(metadata.has_alpha);
    }

    #[test]
    fn test_raw_round_trip_through_png() {
        let codec = ImageCrateCodec::new();
        let original = rgb_gradient(7, 5);
        let layout = RawLayout::new(7, 5, 3);

        let png = ImageHandle::from_raw(&codec, &original, layout)
            .unwrap()
            .to_format("png", EncodeOptions::default())
            .produce()
            .unwrap();
        let decoded = ImageHandle::new(&codec, &png).raw().produce().unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_ensure_alpha_applies_to_raw_extraction() {
        let codec = ImageCrateCodec::new();
        let original = rgb_gradient(4, 4);
        let png = ImageHandle::from_raw(&codec, &original, RawLayout::new(4, 4, 3))
            .unwrap()
            .produce()
            .unwrap();

        let image = ImageHandle::new(&codec, &png)
            .ensure_alpha()
            .raw()
            .into_raw_image()
            .unwrap();
        assert_eq!(image.channels, 4);
        assert_eq!(image.data.len(), 4 * 4 * 4);
        assert!(image.data.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn test_last_to_format_wins() {
        let codec = ImageCrateCodec::new();
        let bytes = ImageHandle::from_raw(&codec, &rgb_gradient(8, 8), RawLayout::new(8, 8, 3))
            .unwrap()
            .to_format("png", EncodeOptions::default())
            .to_format("jpeg", EncodeOptions::with_quality(0.8))
            .produce()
            .unwrap();

        let metadata = ImageHandle::new(&codec, &bytes).inspect().unwrap();
        assert_eq!(metadata.format, ContainerFormat::Jpeg);
    }

    #[test]
    fn test_unsupported_format_falls_back_to_png() {
        let codec = ImageCrateCodec::new();
        let bytes = ImageHandle::from_raw(&codec, &[10u8; 4 * 3 * 3], RawLayout::new(4, 3, 3))
            .unwrap()
            .to_format("bmp", EncodeOptions::default())
            .produce()
            .expect("unsupported formats must not raise");

        let metadata = ImageHandle::new(&codec, &bytes).inspect().unwrap();
        assert_eq!(metadata.format, ContainerFormat::Png);
        assert_eq!((metadata.width, metadata.height), (4, 3));
    }

    #[test]
    fn test_no_format_defaults_to_png() {
        let codec = ImageCrateCodec::new();
        let bytes = ImageHandle::from_raw(&codec, &[0u8; 16], RawLayout::new(2, 2, 4))
            .unwrap()
            .produce()
            .unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn test_invalid_bytes_fail_with_decode_error() {
        let codec = ImageCrateCodec::new();
        let garbage = b"definitely not an image";

        let err = ImageHandle::new(&codec, garbage).inspect().unwrap_err();
        assert!(matches!(err, BgRemovalError::Decode(_)));

        let err = ImageHandle::new(&codec, garbage).produce().unwrap_err();
        assert!(matches!(err, BgRemovalError::Decode(_)));
    }

    #[test]
    fn test_input_buffer_is_not_mutated() {
        let codec = ImageCrateCodec::new();
        let png = ImageHandle::from_raw(&codec, &rgb_gradient(3, 3), RawLayout::new(3, 3, 3))
            .unwrap()
            .produce()
            .unwrap();
        let snapshot = png.clone();

        let _ = ImageHandle::new(&codec, &png)
            .ensure_alpha()
            .to_format("jpeg", EncodeOptions::with_quality(0.5))
            .produce()
            .unwrap();

        assert_eq!(png, snapshot);
    }
}
