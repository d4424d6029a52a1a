use thiserror::Error;

use crate::detection::domain::class_names::ClassNames;
use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Output(String),
}

/// Domain interface for object detection.
///
/// Returns every class the model predicts; label filtering happens in
/// the pipeline. Implementations are shared across request handlers,
/// hence `&self` and `Sync`.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;

    fn class_names(&self) -> &ClassNames;
}
