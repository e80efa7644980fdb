use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// RGB pixels cut out of a frame around one tracked face.
#[derive(Clone, Debug)]
pub struct FaceCrop {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl FaceCrop {
    /// Cuts `bbox` grown by `padding` pixels, clamped to the frame.
    ///
    /// Returns `None` when the clamped region is smaller than `min_size` on
    /// either side, which counts as "no usable face".
    pub fn from_frame(
        frame: &Frame,
        bbox: &BoundingBox,
        padding: f64,
        min_size: u32,
    ) -> Option<Self> {
        let rect = bbox
            .padded(padding)
            .to_crop_rect(frame.width(), frame.height())?;
        if rect.width < min_size || rect.height < min_size || frame.channels() != 3 {
            return None;
        }
        Some(Self {
            data: frame.crop(rect.x, rect.y, rect.width, rect.height),
            width: rect.width,
            height: rect.height,
        })
    }
}
