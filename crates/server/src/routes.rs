use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use phonewatch_core::detection::domain::detection::DetectionReport;
use phonewatch_core::pipeline::detect_phones_use_case::DetectPhonesUseCase;

use crate::error::ApiError;

/// Multipart field carrying the uploaded image.
const FILE_FIELD: &str = "file";

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub use_case: Arc<DetectPhonesUseCase>,
    pub model_name: Arc<str>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/detect", post(detect))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn detect(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionReport>, ApiError> {
    let mut multipart = multipart.map_err(ApiError::NotMultipart)?;
    let bytes = read_file_field(&mut multipart).await?;

    // Decode and inference are CPU-bound; keep them off the reactor.
    let use_case = state.use_case.clone();
    let report = tokio::task::spawn_blocking(move || use_case.execute_bytes(&bytes))
        .await
        .map_err(|e| ApiError::Internal(format!("detection task failed: {e}")))??;

    Ok(Json(report))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(ApiError::Multipart)? {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field.bytes().await.map_err(ApiError::Multipart)?;
            return Ok(bytes.to_vec());
        }
    }
    Err(ApiError::MissingFile)
}

#[derive(Serialize)]
struct Health<'a> {
    status: &'static str,
    model: &'a str,
    target_label: &'a str,
    confidence_threshold: f32,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let filter = state.use_case.filter();
    Json(Health {
        status: "ok",
        model: &state.model_name,
        target_label: filter.label(),
        confidence_threshold: filter.min_confidence(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use phonewatch_core::detection::domain::class_names::ClassNames;
    use phonewatch_core::detection::domain::detection::{BoundingBox, Detection};
    use phonewatch_core::detection::domain::detection_filter::DetectionFilter;
    use phonewatch_core::detection::domain::object_detector::{DetectionError, ObjectDetector};
    use phonewatch_core::shared::frame::Frame;
    use serde_json::{json, Value};
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "phonewatch-test-boundary";

    /// Returns canned detections, or fails when `detections` is `None`.
    struct StubDetector {
        detections: Option<Vec<Detection>>,
        class_names: ClassNames,
    }

    impl ObjectDetector for StubDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
            self.detections
                .clone()
                .ok_or_else(|| DetectionError::Inference("session crashed".into()))
        }

        fn class_names(&self) -> &ClassNames {
            &self.class_names
        }
    }

    struct PanickingDetector(ClassNames);

    impl ObjectDetector for PanickingDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
            panic!("detector blew up");
        }

        fn class_names(&self) -> &ClassNames {
            &self.0
        }
    }

    fn detection(label: &str, confidence: f32, bbox: [f32; 4]) -> Detection {
        Detection {
            label: label.into(),
            confidence,
            bbox: BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]),
            class_id: ClassNames::coco().index_of(label).unwrap_or(0),
        }
    }

    fn app_with(detections: Option<Vec<Detection>>, max_upload_bytes: usize) -> Router {
        let detector = StubDetector {
            detections,
            class_names: ClassNames::coco(),
        };
        let state = AppState {
            use_case: Arc::new(DetectPhonesUseCase::new(
                Box::new(detector),
                DetectionFilter::default(),
            )),
            model_name: Arc::from("stub.onnx"),
        };
        router(state, max_upload_bytes)
    }

    fn app(detections: Vec<Detection>) -> Router {
        app_with(Some(detections), 1024 * 1024)
    }

    fn png_bytes() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(32, 32))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn multipart_request(field: &str, payload: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/detect")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_detect_returns_only_confident_phones() {
        let app = app(vec![
            detection("cell phone", 0.91, [12.0, 8.0, 20.0, 30.0]),
            detection("person", 0.99, [0.0, 0.0, 32.0, 32.0]),
            detection("cell phone", 0.25, [1.0, 1.0, 2.0, 2.0]),
        ]);

        let response = app
            .oneshot(multipart_request("file", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let detections = body["detections"].as_array().unwrap();
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d["label"], "cell phone");
        assert!(d["confidence"].as_f64().unwrap() > 0.3);
        let bbox: Vec<f64> = d["bbox"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        assert_eq!(bbox, vec![12.0, 8.0, 20.0, 30.0]);
        assert_eq!(d.as_object().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_detect_without_phone_returns_empty_list() {
        let app = app(vec![detection("person", 0.99, [0.0, 0.0, 32.0, 32.0])]);

        let response = app
            .oneshot(multipart_request("file", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"detections": []}));
    }

    #[tokio::test]
    async fn test_corrupt_image_is_bad_request() {
        let response = app(Vec::new())
            .oneshot(multipart_request("file", b"garbage bytes, not an image"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("decode"));
    }

    #[tokio::test]
    async fn test_empty_upload_is_bad_request() {
        let response = app(Vec::new())
            .oneshot(multipart_request("file", b""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_file_field_is_unprocessable() {
        let response = app(Vec::new())
            .oneshot(multipart_request("image", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_unprocessable() {
        let request = Request::builder()
            .method("POST")
            .uri("/detect")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app(Vec::new()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let response = app_with(Some(Vec::new()), 512)
            .oneshot(multipart_request("file", &vec![0u8; 4096]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_inference_failure_is_server_error() {
        let response = app_with(None, 1024 * 1024)
            .oneshot(multipart_request("file", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "inference failed: session crashed");
    }

    #[tokio::test]
    async fn test_detector_panic_is_server_error_and_server_keeps_serving() {
        let state = AppState {
            use_case: Arc::new(DetectPhonesUseCase::new(
                Box::new(PanickingDetector(ClassNames::coco())),
                DetectionFilter::default(),
            )),
            model_name: Arc::from("stub.onnx"),
        };
        let app = router(state, 1024 * 1024);

        let response = app
            .clone()
            .oneshot(multipart_request("file", &png_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("detection task failed"));

        let health = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(health).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let mut request = multipart_request("file", &png_bytes());
        request
            .headers_mut()
            .insert(header::ORIGIN, "http://localhost:3000".parse().unwrap());

        let response = app(Vec::new()).oneshot(request).await.unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn test_health_reports_configuration() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app(Vec::new()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "stub.onnx");
        assert_eq!(body["target_label"], "cell phone");
        assert_eq!(body["confidence_threshold"], 0.3);
    }
}
