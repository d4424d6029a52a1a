use thiserror::Error;

use crate::detection::domain::detection::DetectionReport;
use crate::detection::domain::detection_filter::DetectionFilter;
use crate::detection::domain::object_detector::{DetectionError, ObjectDetector};
use crate::shared::frame::Frame;
use crate::shared::image_decoder::{decode_image_bytes, ImageDecodeError};

#[derive(Error, Debug)]
pub enum DetectPhonesError {
    /// The caller sent something that is not a decodable image.
    #[error(transparent)]
    InvalidImage(#[from] ImageDecodeError),
    /// The model failed on a valid image.
    #[error(transparent)]
    Detection(#[from] DetectionError),
}

/// Single-image pipeline: decode → detect → filter.
///
/// Holds no per-request state, so one instance serves every caller.
pub struct DetectPhonesUseCase {
    detector: Box<dyn ObjectDetector>,
    filter: DetectionFilter,
}

impl DetectPhonesUseCase {
    pub fn new(detector: Box<dyn ObjectDetector>, filter: DetectionFilter) -> Self {
        if detector.class_names().index_of(filter.label()).is_none() {
            log::warn!(
                "Label '{}' is not in the model's class table; nothing will match",
                filter.label()
            );
        }
        Self { detector, filter }
    }

    pub fn filter(&self) -> &DetectionFilter {
        &self.filter
    }

    /// Decodes raw upload bytes and runs detection on them.
    pub fn execute_bytes(&self, bytes: &[u8]) -> Result<DetectionReport, DetectPhonesError> {
        let frame = decode_image_bytes(bytes)?;
        Ok(self.execute(&frame)?)
    }

    /// Detects and filters on an already decoded frame.
    pub fn execute(&self, frame: &Frame) -> Result<DetectionReport, DetectionError> {
        let all = self.detector.detect(frame)?;
        let total = all.len();
        let kept = self.filter.apply(all);
        log::debug!(
            "{}x{} image: {total} detections, {} matching '{}'",
            frame.width(),
            frame.height(),
            kept.len(),
            self.filter.label()
        );
        Ok(DetectionReport::new(kept))
    }
}
