use crate::detection::domain::detection::Detection;
use crate::shared::constants::{DEFAULT_CONFIDENCE, TARGET_LABEL};

/// Keeps detections of a single class above a confidence threshold.
///
/// The threshold is exclusive: a detection scoring exactly
/// `min_confidence` is dropped. Input order is preserved.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionFilter {
    label: String,
    min_confidence: f32,
}

impl DetectionFilter {
    pub fn new(label: impl Into<String>, min_confidence: f32) -> Self {
        Self {
            label: label.into(),
            min_confidence,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.label == self.label && detection.confidence > self.min_confidence
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections.into_iter().filter(|d| self.accepts(d)).collect()
    }
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self::new(TARGET_LABEL, DEFAULT_CONFIDENCE)
    }
}
