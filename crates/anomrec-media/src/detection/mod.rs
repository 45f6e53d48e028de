//! Per-slot detection feeding the recording trigger.
//!
//! | Stage | Trait | Default implementation |
//! |-------|-------|------------------------|
//! | Motion | [`MotionEstimator`] | [`GaussianBackgroundModel`] |
//! | Persons | [`PersonDetector`] | [`HogPersonDetector`] |
//!
//! [`DetectionPipeline`] combines both for one camera slot and turns their
//! output into a [`FrameAnalysis`]. Use [`PipelineBuilder`] to assemble a
//! pipeline from settings.

pub mod background;
pub mod bbox;
pub mod hog;
pub mod pipeline;
pub mod pipeline_builder;

use image::GrayImage;

use crate::error::MediaResult;

pub use background::{BackgroundConfig, GaussianBackgroundModel};
pub use bbox::{non_maximum_suppression, sigmoid, BoundingBox, PersonDetection};
pub use hog::{HogConfig, HogPersonDetector, LinearSvm, DESCRIPTOR_LEN};
pub use pipeline::{DetectionConfig, DetectionPipeline, FrameAnalysis};
pub use pipeline_builder::PipelineBuilder;

/// Background-subtraction motion estimator.
///
/// Implementations keep per-slot state; never share one between cameras.
pub trait MotionEstimator: Send {
    /// Fold `gray` into the model and return the foreground fraction in [0, 1].
    fn estimate(&mut self, gray: &GrayImage) -> MediaResult<f64>;

    /// Forget the learned background, e.g. after a reconnect.
    fn reset(&mut self);

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// Person detector over a grayscale frame.
pub trait PersonDetector: Send + Sync {
    fn detect(&self, gray: &GrayImage) -> MediaResult<Vec<PersonDetection>>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}
