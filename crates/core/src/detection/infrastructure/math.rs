//! Box post-processing shared by detection backends.

use crate::shared::bounding_box::BoundingBox;

/// Greedy non-maximum suppression.
///
/// Returns indices into `boxes` of the survivors, highest score first. A box
/// is suppressed when its IoU with an already kept box of the same class
/// exceeds `iou_thresh`.
pub fn non_max_suppression(
    boxes: &[(BoundingBox, f64, usize)],
    iou_thresh: f64,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        boxes[b]
            .1
            .partial_cmp(&boxes[a].1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    for i in order {
        let (bbox, _, class_id) = &boxes[i];
        let suppressed = keep.iter().any(|&k| {
            let (kept, _, kept_class) = &boxes[k];
            kept_class == class_id && kept.iou(bbox) > iou_thresh
        });
        if !suppressed {
            keep.push(i);
        }
    }
    keep
}

/// Index and value of the largest element, ignoring NaN.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}
