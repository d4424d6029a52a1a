//! YOLOv8 object detector using ONNX Runtime via `ort`.
//!
//! Handles letterbox preprocessing, inference, output decoding and
//! class-aware NMS. Boxes are returned in source-image pixels.
use std::fmt::Display;
use std::path::Path;
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};

use crate::detection::domain::class_names::ClassNames;
use crate::detection::domain::detection::{BoundingBox, Detection};
use crate::detection::domain::object_detector::{DetectionError, ObjectDetector};
use crate::detection::infrastructure::execution_provider::preferred_execution_providers;
use crate::detection::infrastructure::math::bbox_iou;
use crate::shared::frame::Frame;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Candidates scoring at or below this are discarded before NMS.
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.25;

/// NMS IoU threshold (same-class boxes overlapping more are suppressed).
pub const DEFAULT_NMS_IOU: f32 = 0.7;

pub const DEFAULT_MAX_DETECTIONS: usize = 300;

/// Letterbox padding value, YOLO convention.
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Key under which Ultralytics exports store the class table.
const NAMES_METADATA_KEY: &str = "names";

/// YOLO detector backed by an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so the session sits behind a
/// mutex and the detector itself can be shared between threads.
pub struct OnnxYoloDetector {
    session: Mutex<ort::session::Session>,
    class_names: ClassNames,
    input_size: u32,
    confidence_floor: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (NCHW),
    /// falling back to 640. Class names come from the model metadata when
    /// present, otherwise the COCO table is assumed.
    pub fn new(model_path: &Path) -> Result<Self, DetectionError> {
        let session = ort::session::Session::builder()
            .map_err(load_err)?
            .with_execution_providers(preferred_execution_providers())
            .map_err(load_err)?
            .commit_from_file(model_path)
            .map_err(load_err)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // [N, C, H, W]; square inputs, so H is enough
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        let class_names = session
            .metadata()
            .ok()
            .and_then(|meta| meta.custom(NAMES_METADATA_KEY))
            .and_then(|raw| ClassNames::from_ultralytics_metadata(&raw))
            .unwrap_or_else(|| {
                log::warn!("Model has no usable class metadata, assuming COCO labels");
                ClassNames::coco()
            });

        log::info!(
            "Loaded {} (input {input_size}x{input_size}, {} classes)",
            model_path.display(),
            class_names.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            class_names,
            input_size,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            iou_threshold: DEFAULT_NMS_IOU,
            max_detections: DEFAULT_MAX_DETECTIONS,
        })
    }

    /// Lowers (or raises) the pre-NMS score cutoff.
    pub fn with_confidence_floor(mut self, floor: f32) -> Self {
        self.confidence_floor = floor;
        self
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        // 1. Preprocess: letterbox + normalize → NCHW float32
        let (input_tensor, geometry) = letterbox(frame, self.input_size)?;

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(input_tensor).map_err(inference_err)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| DetectionError::Inference(format!("Lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(inference_err)?;
        if outputs.len() == 0 {
            return Err(DetectionError::Output("model produced no outputs".into()));
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(inference_err)?;
        let shape = tensor.shape().to_vec();
        let data = tensor
            .as_slice()
            .ok_or_else(|| DetectionError::Output("tensor is not contiguous".into()))?;

        // 3. Decode candidates back to source pixels
        let candidates = decode_output(
            data,
            &shape,
            &geometry,
            self.confidence_floor,
            &self.class_names,
        )?;

        // 4. NMS
        let mut kept = nms(candidates, self.iou_threshold);
        kept.truncate(self.max_detections);
        Ok(kept)
    }

    fn class_names(&self) -> &ClassNames {
        &self.class_names
    }
}

fn load_err(e: impl Display) -> DetectionError {
    DetectionError::ModelLoad(e.to_string())
}

fn inference_err(e: impl Display) -> DetectionError {
    DetectionError::Inference(e.to_string())
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Maps letterboxed model coordinates back to the source image.
#[derive(Clone, Copy, Debug, PartialEq)]
struct LetterboxGeometry {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
    source_width: u32,
    source_height: u32,
}

impl LetterboxGeometry {
    fn to_source(self, cx: f32, cy: f32, w: f32, h: f32) -> BoundingBox {
        let cx = (cx - self.pad_x as f32) / self.scale;
        let cy = (cy - self.pad_y as f32) / self.scale;
        BoundingBox::from_center(cx, cy, w / self.scale, h / self.scale)
            .clip(self.source_width as f32, self.source_height as f32)
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size` with bilinear
/// sampling, padding the short side with YOLO gray.
fn letterbox(
    frame: &Frame,
    target_size: u32,
) -> Result<(ndarray::Array4<f32>, LetterboxGeometry), DetectionError> {
    let fw = frame.width() as f32;
    let fh = frame.height() as f32;
    let target = target_size as f32;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).clamp(1, target_size);
    let new_h = ((fh * scale).round() as u32).clamp(1, target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = ndarray::Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        PAD_VALUE,
    );

    let source: ImageBuffer<Rgb<u8>, &[u8]> =
        ImageBuffer::from_raw(frame.width(), frame.height(), frame.data()).ok_or_else(|| {
            DetectionError::Inference(format!(
                "frame buffer holds {} bytes, too few for {}x{} RGB",
                frame.data().len(),
                frame.width(),
                frame.height()
            ))
        })?;
    let resized = imageops::resize(&source, new_w, new_h, FilterType::Triangle);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let ty = (pad_y + y) as usize;
        let tx = (pad_x + x) as usize;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
        }
    }

    let geometry = LetterboxGeometry {
        scale,
        pad_x,
        pad_y,
        source_width: frame.width(),
        source_height: frame.height(),
    };
    Ok((tensor, geometry))
}

// ---------------------------------------------------------------------------
// Output decoding
// ---------------------------------------------------------------------------

/// Decodes a YOLOv8 head into scored, labelled boxes.
///
/// Accepts `[1, 4 + nc, N]` (the default export, features-major) or
/// `[1, N, 4 + nc]`. The features axis is the one of length
/// `4 + class_names.len()`; when both or neither match, the features-major
/// layout wins unless the first axis is the longer one. Each candidate's
/// confidence is its best class score; candidates whose class index has no
/// label are skipped.
fn decode_output(
    data: &[f32],
    shape: &[usize],
    geometry: &LetterboxGeometry,
    confidence_floor: f32,
    class_names: &ClassNames,
) -> Result<Vec<Detection>, DetectionError> {
    if shape.len() != 3 {
        return Err(DetectionError::Output(format!(
            "unexpected YOLO output shape: {shape:?}"
        )));
    }
    let transposed = is_features_major(shape[1], shape[2], 4 + class_names.len());
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats <= 4 {
        return Err(DetectionError::Output(format!(
            "YOLO output has no class scores: {shape:?}"
        )));
    }
    if data.len() < num_dets * num_feats {
        return Err(DetectionError::Output(format!(
            "YOLO output holds {} values, shape {shape:?} needs {}",
            data.len(),
            num_dets * num_feats
        )));
    }

    let at = |det: usize, feat: usize| {
        if transposed {
            data[feat * num_dets + det]
        } else {
            data[det * num_feats + feat]
        }
    };

    let mut detections = Vec::new();
    for i in 0..num_dets {
        let (class_id, confidence) = (4..num_feats)
            .map(|f| (f - 4, at(i, f)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if confidence <= confidence_floor {
            continue;
        }
        let Some(label) = class_names.get(class_id) else {
            continue;
        };

        detections.push(Detection {
            label: label.to_string(),
            confidence,
            bbox: geometry.to_source(at(i, 0), at(i, 1), at(i, 2), at(i, 3)),
            class_id,
        });
    }
    Ok(detections)
}

/// Whether a `[1, a, b]` head is laid out `[1, features, anchors]`.
///
/// Small input sizes or large class tables can leave fewer anchors than
/// features, so axis length alone cannot tell the layouts apart.
fn is_features_major(a: usize, b: usize, num_feats: usize) -> bool {
    match (a == num_feats, b == num_feats) {
        (true, _) => true,
        (false, true) => false,
        (false, false) => a < b,
    }
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

/// Class-aware greedy NMS: sort by confidence descending, suppress
/// same-class boxes that overlap a kept one.
fn nms(mut dets: Vec<Detection>, iou_thresh: f32) -> Vec<Detection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for det in dets {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && bbox_iou(&k.bbox, &det.bbox) > iou_thresh);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
