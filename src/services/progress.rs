//! Progress reporting service
//!
//! The pipeline reports `(key, current, total)` triples; frontends decide
//! how to render them. The CLI drives a spinner, library callers default to
//! [`NoOpProgressReporter`].

use crate::types::ProcessingTimings;

/// Progress stages of one background removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Decoding the input image
    Decode,
    /// Loading the segmentation model and creating the session
    ModelLoad,
    /// Resizing and normalising into the input tensor
    Preprocess,
    /// Running the model
    Inference,
    /// Mask extraction and compositing
    Postprocess,
    /// Encoding the result
    Encode,
}

impl ProcessingStage {
    /// Every stage in pipeline order
    pub const ALL: [ProcessingStage; 6] = [
        ProcessingStage::Decode,
        ProcessingStage::ModelLoad,
        ProcessingStage::Preprocess,
        ProcessingStage::Inference,
        ProcessingStage::Postprocess,
        ProcessingStage::Encode,
    ];

    /// Key passed to [`ProgressReporter::report`]
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            ProcessingStage::Decode => "decode",
            ProcessingStage::ModelLoad => "load:model",
            ProcessingStage::Preprocess => "preprocess",
            ProcessingStage::Inference => "inference",
            ProcessingStage::Postprocess => "postprocess",
            ProcessingStage::Encode => "encode",
        }
    }

    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            ProcessingStage::Decode => "Decoding input image",
            ProcessingStage::ModelLoad => "Loading segmentation model",
            ProcessingStage::Preprocess => "Preprocessing image",
            ProcessingStage::Inference => "Running inference",
            ProcessingStage::Postprocess => "Generating segmentation mask",
            ProcessingStage::Encode => "Encoding output image",
        }
    }
}

/// Receives progress from the removal pipeline
pub trait ProgressReporter: Send + Sync {
    /// `current` of `total` units of the stage named `key` are done
    fn report(&self, key: &str, current: u64, total: u64);

    /// Report that `stage` has started (`0`) or finished (`1`)
    fn report_stage(&self, stage: ProcessingStage, done: bool) {
        self.report(stage.key(), u64::from(done), 1);
    }

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings) {
        let _ = timings;
    }
}

/// Reporter that discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report(&self, _key: &str, _current: u64, _total: u64) {}
}

/// Reporter that forwards updates to `log` at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report(&self, key: &str, current: u64, total: u64) {
        log::info!("{key}: {}%", percent(current, total));
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        log::info!("Background removal completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  Detailed timings:");
            for line in timing_breakdown(timings) {
                log::info!("    {line}");
            }
        }
    }
}

/// Per-stage timing lines shown by verbose reporters
#[must_use]
pub fn timing_breakdown(timings: &ProcessingTimings) -> Vec<String> {
    vec![
        format!("Image decode: {}ms", timings.decode_ms),
        format!("Model load: {}ms", timings.model_load_ms),
        format!("Preprocessing: {}ms", timings.preprocess_ms),
        format!(
            "Inference: {}ms ({:.0}% of total)",
            timings.inference_ms,
            timings.inference_ratio() * 100.0
        ),
        format!("Postprocessing: {}ms", timings.postprocess_ms),
        format!("Encode: {}ms", timings.encode_ms),
        format!("Other: {}ms", timings.other_overhead_ms()),
    ]
}

/// Rounded completion percentage; an empty total counts as done
#[must_use]
pub fn percent(current: u64, total: u64) -> u64 {
    if total == 0 {
        return 100;
    }
    ((current.min(total) as f64 / total as f64) * 100.0).round() as u64
}
