/// Axis-aligned box in frame pixel coordinates, `(x1, y1)` top-left and
/// `(x2, y2)` bottom-right.
///
/// Detector output is kept in floating point; conversion to an integer
/// crop rectangle happens only when pixels are read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Integer rectangle guaranteed to lie inside the frame it was clamped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_array(bbox: [f64; 4]) -> Self {
        Self::new(bbox[0], bbox[1], bbox[2], bbox[3])
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Grows the box by `padding` pixels on every side.
    pub fn padded(&self, padding: f64) -> Self {
        Self::new(
            self.x1 - padding,
            self.y1 - padding,
            self.x2 + padding,
            self.y2 + padding,
        )
    }

    /// Clamps to a `frame_w` x `frame_h` frame and rounds to whole pixels.
    ///
    /// Returns `None` when nothing of the box remains visible.
    pub fn to_crop_rect(&self, frame_w: u32, frame_h: u32) -> Option<CropRect> {
        let x1 = self.x1.max(0.0).floor() as i64;
        let y1 = self.y1.max(0.0).floor() as i64;
        let x2 = (self.x2.min(frame_w as f64)).ceil() as i64;
        let y2 = (self.y2.min(frame_h as f64)).ceil() as i64;

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(CropRect {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}
