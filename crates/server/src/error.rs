use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use phonewatch_core::detection::domain::object_detector::DetectionError;
use phonewatch_core::pipeline::detect_phones_use_case::DetectPhonesError;
use phonewatch_core::shared::image_decoder::ImageDecodeError;

/// Everything a `/detect` request can fail with, mapped onto HTTP status
/// codes. Bodies are `{"detail": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    NotMultipart(MultipartRejection),
    Multipart(MultipartError),
    MissingFile,
    InvalidImage(ImageDecodeError),
    Inference(DetectionError),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotMultipart(_) | ApiError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Multipart(e) => e.status(),
            ApiError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            ApiError::Inference(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::NotMultipart(e) => e.body_text(),
            ApiError::Multipart(e) => e.body_text(),
            ApiError::MissingFile => "multipart field 'file' is required".to_string(),
            ApiError::InvalidImage(e) => e.to_string(),
            ApiError::Inference(e) => e.to_string(),
            ApiError::Internal(msg) => msg.clone(),
        }
    }
}

impl From<DetectPhonesError> for ApiError {
    fn from(e: DetectPhonesError) -> Self {
        match e {
            DetectPhonesError::InvalidImage(e) => ApiError::InvalidImage(e),
            DetectPhonesError::Detection(e) => ApiError::Inference(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            log::error!("{status}: {detail}");
        } else {
            log::warn!("{status}: {detail}");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
