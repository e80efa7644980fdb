use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

/// Domain interface for detection plus tracking.
///
/// Implementations are stateful (they own a tracker), hence `&mut self`.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;

    /// Class labels this detector can emit.
    fn class_labels(&self) -> &[String];

    /// Forgets every live track after a stream discontinuity. Track ids
    /// issued afterwards must not repeat earlier ones.
    fn reset(&mut self) {}
}
