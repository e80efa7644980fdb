use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::tracking::domain::track_state::{TrackState, TrackStatus};

/// One box to draw, with the label lines rendered above it.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub lines: Vec<String>,
    pub status: TrackStatus,
}

impl Overlay {
    /// Builds the overlay for a tracked entity. Reads the state only.
    pub fn from_state(bbox: BoundingBox, state: &TrackState) -> Self {
        let id = state.track_id();
        let mut lines = vec![format!("ID: {id}")];
        match (state.name(), state.status()) {
            (Some(name), _) => lines.push(name.to_string()),
            (None, TrackStatus::Unknown) => lines.push(format!("Unknown-{id}")),
            (None, TrackStatus::Recognizing) => lines.push("...".to_string()),
            (None, _) if state.class_label() != "face" => {
                lines.push(state.class_label().to_string())
            }
            _ => {}
        }
        Self {
            bbox,
            lines,
            status: state.status(),
        }
    }

    pub fn color(&self) -> [u8; 3] {
        status_color(self.status)
    }
}

/// RGB box colour per lifecycle status.
pub fn status_color(status: TrackStatus) -> [u8; 3] {
    match status {
        TrackStatus::New => [255, 255, 0],
        TrackStatus::Recognizing => [0, 170, 255],
        TrackStatus::Recognized => [0, 255, 0],
        TrackStatus::Unknown => [255, 0, 0],
        TrackStatus::Expired => [128, 128, 128],
    }
}

/// Draws overlays onto a frame in place.
pub trait FrameAnnotator: Send {
    fn annotate(
        &self,
        frame: &mut Frame,
        overlays: &[Overlay],
    ) -> Result<(), Box<dyn std::error::Error>>;
}

/// Leaves frames untouched.
pub struct NoopAnnotator;

impl FrameAnnotator for NoopAnnotator {
    fn annotate(&self, _: &mut Frame, _: &[Overlay]) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}
