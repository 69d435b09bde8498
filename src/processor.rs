//! Background removal pipeline
//!
//! [`BackgroundRemover`] owns one inference session and runs
//! decode → preprocess → inference → mask → compose → encode for each
//! image. The codec and the inference engine come from [`Services`]; the
//! remover never picks adapters itself.

use crate::{
    codec::{EncodeOptions, ImageHandle, RawImage},
    config::{OutputFormat, RemovalConfig, RemovalMode},
    error::{BgRemovalError, Result},
    inference::{InferenceSession, ModelRef},
    services::{NoOpProgressReporter, ProcessingStage, ProgressReporter, Services},
    types::{ProcessingTimings, RemovalOutput, SegmentationMask},
    utils::{CoordinateTransformation, ImagePreprocessor, PreprocessingOptions},
};
use instant::Instant;
use ndarray::Array4;
use std::sync::Arc;
use tracing::{debug, info, info_span, instrument};

/// Runs background removal for one configuration
pub struct BackgroundRemover {
    services: Services,
    config: RemovalConfig,
    model: ModelRef,
    session: Option<Box<dyn InferenceSession>>,
    reporter: Arc<dyn ProgressReporter>,
    preprocessing: PreprocessingOptions,
}

impl std::fmt::Debug for BackgroundRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemover")
            .field("services", &self.services)
            .field("config", &self.config)
            .field("model", &self.model)
            .field("initialized", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemover {
    /// Create a remover whose model is resolved from the config's public path
    ///
    /// # Errors
    /// `BgRemovalError::InvalidConfig` when the configuration is invalid
    pub fn new(services: Services, config: RemovalConfig) -> Result<Self> {
        config.validate()?;
        let model = ModelRef::Location(config.model_location());
        Ok(Self {
            services,
            config,
            model,
            session: None,
            reporter: Arc::new(NoOpProgressReporter),
            preprocessing: PreprocessingOptions::default(),
        })
    }

    /// Load the model from `model` instead of the public path
    #[must_use]
    pub fn with_model(mut self, model: ModelRef) -> Self {
        self.model = model;
        self.session = None;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    #[must_use]
    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Create the inference session
    ///
    /// Idempotent: once a session exists this returns `Ok(None)` without
    /// touching the engine. Otherwise returns the load time.
    ///
    /// # Errors
    /// - `BgRemovalError::FileNotFound` when a `file://` model is missing
    /// - `BgRemovalError::SessionCreate` when the engine rejects the model
    #[instrument(skip(self), fields(model = ?self.model))]
    pub async fn initialize(&mut self) -> Result<Option<u64>> {
        if self.session.is_some() {
            return Ok(None);
        }

        if self.config.debug {
            match serde_json::to_string(&self.config) {
                Ok(json) => debug!(config = %json, "Effective removal configuration"),
                Err(e) => debug!("Failed to serialize configuration: {e}"),
            }
        }

        self.reporter.report_stage(ProcessingStage::ModelLoad, false);
        let start = Instant::now();
        let session = self
            .services
            .session_factory()
            .create_session(&self.model, &self.config.session)
            .await?;
        let elapsed = start.elapsed().as_millis() as u64;
        self.reporter.report_stage(ProcessingStage::ModelLoad, true);

        info!(
            engine = self.services.session_factory().engine_name(),
            input_size = session.input_size(),
            load_ms = elapsed,
            "Model loaded"
        );
        self.session = Some(session);
        Ok(Some(elapsed))
    }

    /// Remove the background (or foreground) from an encoded image
    ///
    /// # Errors
    /// - `BgRemovalError::Decode` for undecodable input
    /// - Model loading errors from [`Self::initialize`]
    /// - `BgRemovalError::Processing` for failures between decode and encode
    /// - `BgRemovalError::Encode` when the result cannot be encoded
    #[instrument(skip(self, input), fields(bytes = input.len(), mode = ?self.config.mode))]
    pub async fn process(&mut self, input: &[u8]) -> Result<RemovalOutput> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        let pixels = info_span!("decode").in_scope(|| -> Result<RawImage> {
            self.reporter.report_stage(ProcessingStage::Decode, false);
            let start = Instant::now();
            let pixels = ImageHandle::new(self.services.codec(), input)
                .ensure_alpha()
                .into_raw_image()?;
            timings.decode_ms = start.elapsed().as_millis() as u64;
            self.reporter.report_stage(ProcessingStage::Decode, true);
            Ok(pixels)
        })?;
        debug!(
            width = pixels.width,
            height = pixels.height,
            channels = pixels.channels,
            "Decoded input"
        );

        if let Some(load_ms) = self.initialize().await? {
            timings.model_load_ms = load_ms;
        }

        let mask = self.segment(&pixels, &mut timings).await?;

        let composed = info_span!("compose").in_scope(|| -> Result<RawImage> {
            let start = Instant::now();
            let composed = compose(&pixels, &mask, self.config.mode)?;
            timings.postprocess_ms += start.elapsed().as_millis() as u64;
            self.reporter.report_stage(ProcessingStage::Postprocess, true);
            Ok(composed)
        })?;

        let (bytes, format) = info_span!("encode").in_scope(|| -> Result<_> {
            self.reporter.report_stage(ProcessingStage::Encode, false);
            let start = Instant::now();
            let encoded = self.encode(&composed)?;
            timings.encode_ms = start.elapsed().as_millis() as u64;
            self.reporter.report_stage(ProcessingStage::Encode, true);
            Ok(encoded)
        })?;

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        self.reporter.report_completion(&timings);

        let mask_statistics = mask.statistics();
        info!(
            width = composed.width,
            height = composed.height,
            %format,
            output_bytes = bytes.len(),
            foreground_ratio = mask_statistics.foreground_ratio,
            total_ms = timings.total_ms,
            "Image processed"
        );

        Ok(RemovalOutput {
            bytes,
            width: composed.width,
            height: composed.height,
            format,
            mode: self.config.mode,
            mask_statistics,
            timings,
        })
    }

    /// Preprocess, run the model and extract the mask
    async fn segment(
        &mut self,
        pixels: &RawImage,
        timings: &mut ProcessingTimings,
    ) -> Result<SegmentationMask> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| BgRemovalError::processing("Inference session not initialized"))?;
        let input_size = session.input_size();

        self.reporter.report_stage(ProcessingStage::Preprocess, false);
        let start = Instant::now();
        let preprocessed = match ImagePreprocessor::preprocess(pixels, input_size, &self.preprocessing)
        {
            Ok(preprocessed) => preprocessed,
            Err(e) => {
                self.session = Some(session);
                return Err(BgRemovalError::processing_stage_error(
                    "preprocess",
                    &e.to_string(),
                ));
            },
        };
        timings.preprocess_ms = start.elapsed().as_millis() as u64;
        self.reporter.report_stage(ProcessingStage::Preprocess, true);

        // The session moves onto the blocking pool and comes back with the output
        self.reporter.report_stage(ProcessingStage::Inference, false);
        let start = Instant::now();
        let tensor = preprocessed.tensor;
        let (session, output) = tokio::task::spawn_blocking(move || {
            let output = session.run(&tensor);
            (session, output)
        })
        .await
        .map_err(|e| BgRemovalError::processing_stage_error("inference", &e.to_string()))?;
        self.session = Some(session);
        let output = output
            .map_err(|e| BgRemovalError::processing_stage_error("inference", &e.to_string()))?;
        timings.inference_ms = start.elapsed().as_millis() as u64;
        self.reporter.report_stage(ProcessingStage::Inference, true);

        self.reporter.report_stage(ProcessingStage::Postprocess, false);
        let start = Instant::now();
        let mask = tensor_to_mask(&output, (pixels.width, pixels.height), preprocessed.transformation)
            .map_err(|e| BgRemovalError::processing_stage_error("postprocess", &e.to_string()))?;
        timings.postprocess_ms = start.elapsed().as_millis() as u64;

        Ok(mask)
    }

    fn encode(&self, image: &RawImage) -> Result<(Vec<u8>, OutputFormat)> {
        let codec = self.services.codec();
        let requested = self.config.output_format;
        let format = if codec.resolve_format(requested.as_str()).is_some() {
            requested
        } else {
            OutputFormat::Png
        };
        if drops_alpha(image, format) {
            debug!(%format, "Output format has no alpha channel; transparency is flattened");
        }

        let bytes = ImageHandle::from_raw(codec, &image.data, image.layout())?
            .to_format(
                requested.as_str(),
                EncodeOptions::with_quality(self.config.quality),
            )
            .produce()?;
        Ok((bytes, format))
    }
}

/// Whether encoding `image` as `format` loses its alpha channel
fn drops_alpha(image: &RawImage, format: OutputFormat) -> bool {
    image.channels == 4 && !format.supports_transparency()
}

/// Map the model output back onto the original pixels
///
/// `transformation` is reused when the output has the input's resolution;
/// otherwise the placement is recomputed for the output size.
fn tensor_to_mask(
    tensor: &Array4<f32>,
    original_dimensions: (u32, u32),
    transformation: CoordinateTransformation,
) -> Result<SegmentationMask> {
    let (n, c, mask_height, mask_width) = tensor.dim();
    if n != 1 || c != 1 {
        return Err(BgRemovalError::processing(format!(
            "Invalid output tensor shape {:?}, expected [1, 1, H, W]",
            tensor.shape()
        )));
    }
    if mask_height != mask_width {
        return Err(BgRemovalError::processing(format!(
            "Expected a square mask, got {mask_width}x{mask_height}"
        )));
    }

    let transformation = if mask_width == transformation.target_size as usize {
        transformation
    } else {
        CoordinateTransformation::fit(original_dimensions, mask_width as u32)?
    };

    let (orig_width, orig_height) = original_dimensions;
    let mut mask_data = Vec::with_capacity(orig_width as usize * orig_height as usize);
    for y in 0..orig_height {
        for x in 0..orig_width {
            let value = transformation
                .to_canvas(x, y)
                .and_then(|(tx, ty)| tensor.get([0, 0, ty, tx]).copied())
                .unwrap_or(0.0);
            mask_data.push((value.clamp(0.0, 1.0) * 255.0) as u8);
        }
    }

    SegmentationMask::new(mask_data, original_dimensions)
}

/// Combine pixels and mask into an RGBA image according to `mode`
fn compose(pixels: &RawImage, mask: &SegmentationMask, mode: RemovalMode) -> Result<RawImage> {
    if pixels.channels != 4 {
        return Err(BgRemovalError::processing(format!(
            "Expected RGBA pixels, got {} channels",
            pixels.channels
        )));
    }
    if (pixels.width, pixels.height) != mask.dimensions {
        return Err(BgRemovalError::processing(
            "Image and mask dimensions do not match",
        ));
    }

    let mut data = Vec::with_capacity(pixels.data.len());
    for (pixel, &value) in pixels.data.chunks_exact(4).zip(&mask.data) {
        let rgba = match (mode, pixel) {
            (RemovalMode::SegmentOnly, _) => [255, 255, 255, value],
            (RemovalMode::RemoveBackground, &[r, g, b, _]) if value > 0 => [r, g, b, value],
            (RemovalMode::RemoveForeground, &[r, g, b, _]) if value < 255 => {
                [r, g, b, 255 - value]
            },
            _ => [0, 0, 0, 0],
        };
        data.extend_from_slice(&rgba);
    }

    Ok(RawImage {
        width: pixels.width,
        height: pixels.height,
        channels: 4,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{MockEngine, MockEngineCall, MockMask};
    use crate::codec::{ContainerFormat, ImageCodec, ImageCrateCodec};
    use std::sync::Mutex;

    fn services(engine: MockEngine) -> Services {
        Services::builder().engine(Arc::new(engine)).build().unwrap()
    }

    fn config(mode: RemovalMode) -> RemovalConfig {
        RemovalConfig::builder()
            .mode(mode)
            .public_path("file:///nonexistent/assets/")
            .build()
            .unwrap()
    }

    fn opaque_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let data = rgb.repeat((width * height) as usize);
        ImageCrateCodec
            .encode(
                &RawImage {
                    width,
                    height,
                    channels: 3,
                    data,
                },
                ContainerFormat::Png,
                &EncodeOptions::default(),
            )
            .unwrap()
    }

    fn pixel(image: &RawImage, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * image.width + x) * 4) as usize;
        [
            image.data[i],
            image.data[i + 1],
            image.data[i + 2],
            image.data[i + 3],
        ]
    }

    async fn run(mode: RemovalMode, engine: MockEngine) -> (RemovalOutput, RawImage) {
        let mut remover = BackgroundRemover::new(services(engine), config(mode))
            .unwrap()
            .with_model(ModelRef::Buffer(b"mock".to_vec()));
        let output = remover.process(&opaque_png(100, 100, [10, 200, 30])).await.unwrap();
        let decoded = ImageCrateCodec.decode(&output.bytes).unwrap().with_alpha();
        (output, decoded)
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<(String, u64, u64)>>);

    impl ProgressReporter for Recording {
        fn report(&self, key: &str, current: u64, total: u64) {
            self.0.lock().unwrap().push((key.to_string(), current, total));
        }
    }

    #[tokio::test]
    async fn test_remove_background() {
        let (output, image) = run(RemovalMode::RemoveBackground, MockEngine::new()).await;

        assert_eq!((output.width, output.height), (100, 100));
        assert_eq!(output.format, OutputFormat::Png);
        assert_eq!(pixel(&image, 0, 0), [0, 0, 0, 0]);
        assert_eq!(pixel(&image, 50, 50), [10, 200, 30, 255]);
        assert!(output.mask_statistics.foreground_ratio > 0.2);
        assert!(output.mask_statistics.foreground_ratio < 0.3);
    }

    #[tokio::test]
    async fn test_remove_foreground_inverts_alpha() {
        let (_, image) = run(RemovalMode::RemoveForeground, MockEngine::new()).await;

        assert_eq!(pixel(&image, 0, 0), [10, 200, 30, 255]);
        assert_eq!(pixel(&image, 50, 50), [0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_segment_only_is_white_with_mask_alpha() {
        let (_, image) = run(RemovalMode::SegmentOnly, MockEngine::new()).await;

        assert_eq!(pixel(&image, 50, 50), [255, 255, 255, 255]);
        assert_eq!(pixel(&image, 0, 0)[3], 0);
    }

    #[tokio::test]
    async fn test_partial_mask_scales_alpha() {
        let engine = MockEngine::new().with_mask(MockMask::Constant(0.5));
        let (_, image) = run(RemovalMode::RemoveBackground, engine).await;
        assert_eq!(pixel(&image, 3, 97), [10, 200, 30, 127]);
    }

    #[test]
    fn test_drops_alpha_only_for_opaque_formats() {
        let rgba = RawImage {
            width: 1,
            height: 1,
            channels: 4,
            data: vec![0; 4],
        };
        let rgb = RawImage {
            channels: 3,
            data: vec![0; 3],
            ..rgba.clone()
        };
        assert!(drops_alpha(&rgba, OutputFormat::Jpeg));
        assert!(!drops_alpha(&rgba, OutputFormat::Png));
        assert!(!drops_alpha(&rgb, OutputFormat::Jpeg));
    }

    #[tokio::test]
    async fn test_jpeg_output() {
        let services = services(MockEngine::new());
        let config = RemovalConfig::builder()
            .output_format(OutputFormat::Jpeg)
            .quality(0.8)
            .public_path("file:///nonexistent/")
            .build()
            .unwrap();
        let mut remover = BackgroundRemover::new(services, config)
            .unwrap()
            .with_model(ModelRef::Buffer(vec![1]));

        let output = remover.process(&opaque_png(40, 20, [0, 0, 255])).await.unwrap();
        assert_eq!(output.format, OutputFormat::Jpeg);
        assert!(output.bytes.starts_with(&[0xFF, 0xD8]));
        assert_eq!((output.width, output.height), (40, 20));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let engine = MockEngine::new();
        let mut remover = BackgroundRemover::new(services(engine.clone()), config(RemovalMode::default()))
            .unwrap()
            .with_model(ModelRef::Buffer(vec![0; 3]));

        assert!(remover.initialize().await.unwrap().is_some());
        assert!(remover.initialize().await.unwrap().is_none());
        remover.process(&opaque_png(8, 8, [1, 2, 3])).await.unwrap();

        assert!(remover.is_initialized());
        assert_eq!(engine.calls(), vec![MockEngineCall::FromBuffer(3)]);
    }

    #[tokio::test]
    async fn test_model_location_from_public_path() {
        let engine = MockEngine::new();
        let config = RemovalConfig::builder()
            .public_path("https://cdn.example.com/bg/")
            .build()
            .unwrap();
        let mut remover = BackgroundRemover::new(services(engine.clone()), config).unwrap();

        remover.initialize().await.unwrap();
        assert_eq!(
            engine.calls(),
            vec![MockEngineCall::FromLocation(
                "https://cdn.example.com/bg/models/isnet_fp16.onnx".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_missing_model_file() {
        let engine = MockEngine::new();
        let mut remover =
            BackgroundRemover::new(services(engine.clone()), config(RemovalMode::default())).unwrap();

        let err = remover.process(&opaque_png(8, 8, [0, 0, 0])).await.unwrap_err();
        assert!(matches!(err, BgRemovalError::FileNotFound(_)));
        assert!(engine.calls().is_empty());
        assert!(!remover.is_initialized());
    }

    #[tokio::test]
    async fn test_undecodable_input() {
        let mut remover = BackgroundRemover::new(services(MockEngine::new()), config(RemovalMode::default()))
            .unwrap()
            .with_model(ModelRef::Buffer(vec![0]));

        let err = remover.process(b"definitely not an image").await.unwrap_err();
        assert!(matches!(err, BgRemovalError::Decode(_)));
    }

    #[tokio::test]
    async fn test_progress_keys_in_order() {
        let reporter = Arc::new(Recording::default());
        let mut remover = BackgroundRemover::new(services(MockEngine::new()), config(RemovalMode::default()))
            .unwrap()
            .with_model(ModelRef::Buffer(vec![0]))
            .with_progress(reporter.clone());

        remover.process(&opaque_png(8, 8, [0, 0, 0])).await.unwrap();

        let finished: Vec<String> = reporter
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, current, total)| current == total)
            .map(|(key, _, _)| key.clone())
            .collect();
        assert_eq!(
            finished,
            ["decode", "load:model", "preprocess", "inference", "postprocess", "encode"]
        );
    }

    #[test]
    fn test_tensor_to_mask_rejects_bad_shape() {
        let t = CoordinateTransformation::fit((4, 4), 4).unwrap();
        assert!(tensor_to_mask(&Array4::zeros((1, 3, 4, 4)), (4, 4), t).is_err());
        assert!(tensor_to_mask(&Array4::zeros((1, 1, 4, 8)), (4, 4), t).is_err());
    }

    #[test]
    fn test_tensor_to_mask_other_resolution() {
        let t = CoordinateTransformation::fit((4, 4), 4).unwrap();
        let mask = tensor_to_mask(&Array4::from_elem((1, 1, 8, 8), 2.0), (4, 4), t).unwrap();
        assert_eq!(mask.dimensions, (4, 4));
        assert!(mask.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_compose_requires_rgba() {
        let pixels = RawImage {
            width: 1,
            height: 1,
            channels: 3,
            data: vec![1, 2, 3],
        };
        let mask = SegmentationMask::new(vec![255], (1, 1)).unwrap();
        assert!(compose(&pixels, &mask, RemovalMode::RemoveBackground).is_err());
    }
}
