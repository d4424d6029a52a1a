/// ONNX export of the pretrained YOLOv8s COCO detector.
pub const YOLO_MODEL_NAME: &str = "yolov8s.onnx";

/// Directory searched for a model shipped next to the binary.
pub const BUNDLED_MODEL_DIR: &str = "models";

pub const TARGET_LABEL: &str = "cell phone";

/// Detections must score strictly above this to be reported.
pub const DEFAULT_CONFIDENCE: f32 = 0.3;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "tif", "webp"];
