//! Builder assembling per-slot detection pipelines from settings.
//!
//! The person model is loaded once and shared by every slot; each slot gets
//! its own background model.

use std::path::Path;
use std::sync::Arc;

use anomrec_models::Settings;
use tracing::{info, warn};

use super::background::{BackgroundConfig, GaussianBackgroundModel};
use super::hog::HogPersonDetector;
use super::pipeline::{DetectionConfig, DetectionPipeline};
use super::PersonDetector;
use crate::error::MediaResult;

/// Builder for detection pipelines.
///
/// # Example
///
/// ```ignore
/// let builder = PipelineBuilder::from_settings(&settings).load_person_model(Some(path))?;
/// let mut pipeline = builder.build(0);
/// let analysis = pipeline.analyze(&frame);
/// ```
pub struct PipelineBuilder {
    config: DetectionConfig,
    background: BackgroundConfig,
    person: Option<Arc<dyn PersonDetector>>,
}

impl PipelineBuilder {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            config: DetectionConfig::from_settings(settings),
            background: BackgroundConfig::default(),
            person: None,
        }
    }

    pub fn with_background(mut self, background: BackgroundConfig) -> Self {
        self.background = background;
        self
    }

    pub fn with_person_detector(mut self, detector: Arc<dyn PersonDetector>) -> Self {
        self.person = Some(detector);
        self
    }

    /// Load the HOG person model if a path is given.
    ///
    /// Without a model, person detection is disabled and every frame
    /// reports zero persons.
    pub fn load_person_model(self, path: Option<&Path>) -> MediaResult<Self> {
        match path {
            Some(path) => {
                let detector = HogPersonDetector::from_model_file(path)?;
                Ok(self.with_person_detector(Arc::new(detector)))
            }
            None => {
                if self.config.enable_person {
                    warn!("Person detection enabled but no model configured; person counts will be zero");
                }
                Ok(self)
            }
        }
    }

    /// Build the pipeline for one slot.
    pub fn build(&self, slot: u32) -> DetectionPipeline {
        let mut pipeline = DetectionPipeline::new(slot, self.config)
            .with_motion(Box::new(GaussianBackgroundModel::new(self.background)));
        if let Some(person) = &self.person {
            pipeline = pipeline.with_person(Arc::clone(person));
        }
        info!(
            slot,
            threshold = self.config.motion_threshold,
            person_detector = pipeline.has_person_detector(),
            "Built detection pipeline"
        );
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::hog::{LinearSvm, DESCRIPTOR_LEN};

    #[test]
    fn test_build_without_model() {
        let builder = PipelineBuilder::from_settings(&Settings::default())
            .load_person_model(None)
            .unwrap();
        let pipeline = builder.build(0);
        assert!(!pipeline.has_person_detector());
        assert_eq!(pipeline.config().motion_threshold, 0.05);
    }

    #[test]
    fn test_model_is_shared_between_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("person.json");
        let model = LinearSvm {
            weights: vec![0.0; DESCRIPTOR_LEN],
            bias: -1.0,
        };
        std::fs::write(&path, serde_json::to_string(&model).unwrap()).unwrap();

        let builder = PipelineBuilder::from_settings(&Settings::default())
            .load_person_model(Some(&path))
            .unwrap();
        assert!(builder.build(0).has_person_detector());
        assert!(builder.build(1).has_person_detector());
    }

    #[test]
    fn test_missing_model_is_an_error() {
        let result = PipelineBuilder::from_settings(&Settings::default())
            .load_person_model(Some(Path::new("/nonexistent/person.json")));
        assert!(result.is_err());
    }
}
