#[derive(Clone, Debug, PartialEq)]
pub struct StreamMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub source_url: String,
}

impl StreamMetadata {
    /// Frame rate used for encoding and pacing; live sources often report 0.
    pub fn effective_fps(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            crate::shared::constants::FALLBACK_FPS
        }
    }
}
