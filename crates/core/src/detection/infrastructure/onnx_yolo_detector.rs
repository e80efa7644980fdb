use std::path::Path;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::load_session;

use super::bytetrack_tracker::{ByteTracker, TrackerInput};
use super::math::{argmax, non_max_suppression};

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Scores at or above this floor are passed to the tracker, which needs
/// low-confidence boxes to keep existing tracks alive.
const TRACKER_SCORE_FLOOR: f64 = 0.1;

/// YOLO object detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, class decoding, per-class
/// NMS and ByteTrack tracking. Works with single-class face models (whose
/// rows carry trailing keypoints) and with multi-class models alike: the
/// first `4 + class_labels.len()` features of each row are read as box and
/// class scores and anything after is ignored.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    tracker: ByteTracker,
    class_labels: Vec<String>,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(
        model_path: &Path,
        class_labels: Vec<String>,
        tracker: ByteTracker,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if class_labels.is_empty() {
            return Err("YOLO detector needs at least one class label".into());
        }
        let session = load_session(model_path, None)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
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

        log::info!(
            "YOLO detector ready: input {input_size}px, classes {:?}, confidence {confidence}",
            class_labels
        );

        Ok(Self {
            session,
            tracker: tracker.with_high_threshold(confidence),
            class_labels,
            confidence,
            input_size,
        })
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        if frame.channels() != 3 || frame.width() == 0 || frame.height() == 0 {
            return Err(format!(
                "YOLO detector needs a non-empty RGB frame, got {}x{}x{}",
                frame.width(),
                frame.height(),
                frame.channels()
            )
            .into());
        }

        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let letterbox = Letterbox {
            scale,
            pad_x: pad_x as f64,
            pad_y: pad_y as f64,
        };
        let candidates = decode_rows(
            data,
            &shape,
            self.class_labels.len(),
            TRACKER_SCORE_FLOOR.min(self.confidence),
            &letterbox,
        )?;

        let keep = non_max_suppression(&candidates, NMS_IOU_THRESH);
        let tracker_input: Vec<TrackerInput> = keep
            .iter()
            .map(|&i| TrackerInput {
                bbox: candidates[i].0,
                score: candidates[i].1,
                class_id: candidates[i].2,
            })
            .collect();

        let tracks = self.tracker.update(&tracker_input);

        Ok(tracks
            .into_iter()
            .map(|t| Detection {
                track_id: t.id,
                class_label: self.class_labels[t.class_id].clone(),
                bbox: t.bbox,
                confidence: tracker_input[t.det_index].score,
            })
            .collect())
    }

    fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    fn reset(&mut self) {
        self.tracker.reset();
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

struct Letterbox {
    scale: f64,
    pad_x: f64,
    pad_y: f64,
}

impl Letterbox {
    fn unmap(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 grey, the YOLO convention.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Turns raw YOLO output into `(box in frame coords, score, class id)`.
///
/// YOLO output is `[1, features, detections]` (transposed) or
/// `[1, detections, features]`; both are handled.
fn decode_rows(
    data: &[f32],
    shape: &[usize],
    num_classes: usize,
    min_score: f64,
    letterbox: &Letterbox,
) -> Result<Vec<(BoundingBox, f64, usize)>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 4 + num_classes {
        return Err(format!(
            "YOLO output has {num_feats} features per row, {num_classes} classes need {}",
            4 + num_classes
        )
        .into());
    }
    if data.len() < num_dets * num_feats {
        return Err("YOLO output is shorter than its shape".into());
    }

    let mut row = vec![0.0f32; 4 + num_classes];
    let mut out = Vec::new();
    for i in 0..num_dets {
        for (f, value) in row.iter_mut().enumerate() {
            *value = if transposed {
                data[f * num_dets + i]
            } else {
                data[i * num_feats + f]
            };
        }

        let Some((class_id, score)) = argmax(&row[4..]) else {
            continue;
        };
        let score = score as f64;
        if score < min_score {
            continue;
        }

        let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);
        out.push((BoundingBox::new(x1, y1, x2, y2), score, class_id));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
