use crate::shared::bounding_box::BoundingBox;

/// One tracked object in one frame.
///
/// Produced fresh by the detector for every frame and never persisted past
/// it. `track_id` is stable for the same physical entity across the frames
/// of one continuous appearance.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub track_id: u32,
    pub class_label: String,
    pub bbox: BoundingBox,
    pub confidence: f64,
}
