//! Box geometry shared by detection backends.

use crate::detection::domain::detection::BoundingBox;

/// Intersection-over-union of two boxes.
pub fn bbox_iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x_min().max(b.x_min());
    let y1 = a.y_min().max(b.y_min());
    let x2 = a.x_max().min(b.x_max());
    let y2 = a.y_max().min(b.y_max());

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    inter / (a.area() + b.area() - inter)
}
