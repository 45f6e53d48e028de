//! Per-slot detection pipeline.

use std::sync::Arc;

use anomrec_models::{MotionSignal, Settings, MOTION_THRESHOLD_MAX};
use tracing::warn;

use super::bbox::PersonDetection;
use super::{MotionEstimator, PersonDetector};
use crate::frame::Frame;
use crate::metrics;

/// Trigger configuration for one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    /// Foreground fraction above which motion triggers (0.0-0.3)
    pub motion_threshold: f64,
    pub enable_motion: bool,
    pub enable_person: bool,
    /// Count a detected person as a trigger
    pub person_triggers: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl DetectionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            motion_threshold: settings.motion_threshold.clamp(0.0, MOTION_THRESHOLD_MAX),
            enable_motion: settings.enable_motion,
            enable_person: settings.enable_person,
            person_triggers: settings.person_triggers_recording,
        }
    }
}

/// Detection output for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameAnalysis {
    pub motion: MotionSignal,
    pub persons: Vec<PersonDetection>,
    /// Whether the recorder should treat this frame as a trigger
    pub trigger: bool,
}

impl FrameAnalysis {
    pub fn person_count(&self) -> u32 {
        self.persons.len() as u32
    }
}

/// Motion estimator plus person detector for one camera slot.
pub struct DetectionPipeline {
    slot: u32,
    config: DetectionConfig,
    motion: Option<Box<dyn MotionEstimator>>,
    person: Option<Arc<dyn PersonDetector>>,
}

impl DetectionPipeline {
    pub fn new(slot: u32, config: DetectionConfig) -> Self {
        Self {
            slot,
            config,
            motion: None,
            person: None,
        }
    }

    pub fn with_motion(mut self, estimator: Box<dyn MotionEstimator>) -> Self {
        self.motion = Some(estimator);
        self
    }

    /// Person detectors are stateless and may be shared between slots.
    pub fn with_person(mut self, detector: Arc<dyn PersonDetector>) -> Self {
        self.person = Some(detector);
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DetectionConfig) {
        self.config = DetectionConfig {
            motion_threshold: config.motion_threshold.clamp(0.0, MOTION_THRESHOLD_MAX),
            ..config
        };
    }

    /// Change the motion threshold, clamped to the accepted range.
    pub fn set_threshold(&mut self, threshold: f64) {
        if threshold.is_finite() {
            self.config.motion_threshold = threshold.clamp(0.0, MOTION_THRESHOLD_MAX);
        }
    }

    pub fn has_person_detector(&self) -> bool {
        self.person.is_some()
    }

    /// Forget the learned background, e.g. after the camera reconnects.
    pub fn reset(&mut self) {
        if let Some(motion) = self.motion.as_mut() {
            motion.reset();
        }
    }

    /// Analyse one frame.
    ///
    /// Detector failures are logged and treated as "nothing detected" so a
    /// flaky detector never stalls recording.
    pub fn analyze(&mut self, frame: &Frame) -> FrameAnalysis {
        if frame.is_empty() {
            return FrameAnalysis::default();
        }

        let run_motion = self.config.enable_motion && self.motion.is_some();
        let run_person = self.config.enable_person && self.person.is_some();
        if !run_motion && !run_person {
            return FrameAnalysis::default();
        }

        let gray = frame.to_gray();

        let motion = match self.motion.as_mut() {
            Some(estimator) if run_motion => match estimator.estimate(&gray) {
                Ok(level) => MotionSignal::evaluate(level, self.config.motion_threshold),
                Err(e) => {
                    warn!(slot = self.slot, estimator = estimator.name(), error = %e, "Motion estimation failed");
                    metrics::record_detector_error(estimator.name());
                    MotionSignal::none()
                }
            },
            _ => MotionSignal::none(),
        };
        if run_motion {
            metrics::record_motion_level(self.slot, motion.level);
        }

        let persons = match self.person.as_ref() {
            Some(detector) if run_person => match detector.detect(&gray) {
                Ok(persons) => persons,
                Err(e) => {
                    warn!(slot = self.slot, detector = detector.name(), error = %e, "Person detection failed");
                    metrics::record_detector_error(detector.name());
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        let trigger = motion.trigger || (self.config.person_triggers && !persons.is_empty());

        FrameAnalysis {
            motion,
            persons,
            trigger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::bbox::BoundingBox;
    use crate::error::{MediaError, MediaResult};
    use chrono::Utc;
    use image::{GrayImage, RgbImage};

    struct FixedMotion(f64);

    impl MotionEstimator for FixedMotion {
        fn estimate(&mut self, _gray: &GrayImage) -> MediaResult<f64> {
            Ok(self.0)
        }
        fn reset(&mut self) {}
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FixedPersons(usize);

    impl PersonDetector for FixedPersons {
        fn detect(&self, _gray: &GrayImage) -> MediaResult<Vec<PersonDetection>> {
            Ok((0..self.0)
                .map(|i| {
                    PersonDetection::new(BoundingBox::new(i as f64 * 100.0, 0.0, 64.0, 128.0), 0.8)
                })
                .collect())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FailingPersons;

    impl PersonDetector for FailingPersons {
        fn detect(&self, _gray: &GrayImage) -> MediaResult<Vec<PersonDetection>> {
            Err(MediaError::detection_failed("boom"))
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::new(32, 32), 0.0, Utc::now())
    }

    #[test]
    fn test_motion_trigger_uses_threshold() {
        let mut pipeline = DetectionPipeline::new(0, DetectionConfig::default())
            .with_motion(Box::new(FixedMotion(0.08)));

        let analysis = pipeline.analyze(&frame());
        assert!(analysis.trigger);
        assert_eq!(analysis.motion.level, 0.08);

        pipeline.set_threshold(0.1);
        assert!(!pipeline.analyze(&frame()).trigger);
    }

    #[test]
    fn test_threshold_is_clamped() {
        let mut pipeline = DetectionPipeline::new(0, DetectionConfig::default());
        pipeline.set_threshold(0.9);
        assert_eq!(pipeline.config().motion_threshold, MOTION_THRESHOLD_MAX);
        pipeline.set_threshold(-1.0);
        assert_eq!(pipeline.config().motion_threshold, 0.0);
    }

    #[test]
    fn test_person_count_and_optional_trigger() {
        let config = DetectionConfig::default();
        let mut pipeline = DetectionPipeline::new(1, config)
            .with_motion(Box::new(FixedMotion(0.0)))
            .with_person(Arc::new(FixedPersons(2)));

        let analysis = pipeline.analyze(&frame());
        assert_eq!(analysis.person_count(), 2);
        assert!(!analysis.trigger);

        pipeline.set_config(DetectionConfig {
            person_triggers: true,
            ..config
        });
        assert!(pipeline.analyze(&frame()).trigger);
    }

    #[test]
    fn test_disabled_stages_are_skipped() {
        let config = DetectionConfig {
            enable_motion: false,
            enable_person: false,
            ..DetectionConfig::default()
        };
        let mut pipeline = DetectionPipeline::new(0, config)
            .with_motion(Box::new(FixedMotion(1.0)))
            .with_person(Arc::new(FixedPersons(3)));

        assert_eq!(pipeline.analyze(&frame()), FrameAnalysis::default());
    }

    #[test]
    fn test_detector_failure_degrades_to_nothing() {
        let mut pipeline = DetectionPipeline::new(0, DetectionConfig::default())
            .with_person(Arc::new(FailingPersons));
        let analysis = pipeline.analyze(&frame());
        assert_eq!(analysis.person_count(), 0);
        assert!(!analysis.trigger);
    }
}
