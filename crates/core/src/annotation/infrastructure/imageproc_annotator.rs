use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::annotation::domain::frame_annotator::{FrameAnnotator, Overlay};
use crate::shared::frame::Frame;

const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: f32 = 18.0;
const LABEL_PADDING: u32 = 2;

/// RGB view drawn directly over a frame's pixel buffer.
type FrameCanvas<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

/// Draws status-coloured boxes with imageproc. Labels are rendered only
/// when a TTF font has been loaded.
pub struct ImageprocAnnotator {
    font: Option<FontVec>,
    scale: PxScale,
    thickness: u32,
}

impl ImageprocAnnotator {
    pub fn new() -> Self {
        Self {
            font: None,
            scale: PxScale::from(LABEL_SCALE),
            thickness: BOX_THICKNESS,
        }
    }

    pub fn with_font_file(mut self, path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(path)
            .map_err(|e| format!("failed to read font {}: {e}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| format!("invalid font {}: {e}", path.display()))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1);
        self
    }

    fn draw(&self, img: &mut FrameCanvas<'_>, overlay: &Overlay) {
        let (w, h) = img.dimensions();
        let Some(rect) = overlay.bbox.to_crop_rect(w, h) else {
            return;
        };
        let color = Rgb(overlay.color());

        for t in 0..self.thickness {
            if rect.width <= 2 * t || rect.height <= 2 * t {
                break;
            }
            let r = Rect::at((rect.x + t) as i32, (rect.y + t) as i32)
                .of_size(rect.width - 2 * t, rect.height - 2 * t);
            draw_hollow_rect_mut(img, r, color);
        }

        if let Some(font) = &self.font {
            self.draw_label(img, font, overlay, rect.x as i32, rect.y as i32, color);
        }
    }

    fn draw_label(
        &self,
        img: &mut FrameCanvas<'_>,
        font: &FontVec,
        overlay: &Overlay,
        x: i32,
        box_top: i32,
        color: Rgb<u8>,
    ) {
        let line_height = self.scale.y.ceil() as i32 + LABEL_PADDING as i32;
        let block = line_height * overlay.lines.len() as i32;
        // Labels go above the box, or inside it at the top edge.
        let mut y = if box_top >= block { box_top - block } else { box_top };

        for line in &overlay.lines {
            let (tw, _) = text_size(self.scale, font, line);
            if tw > 0 {
                let bg = Rect::at(x, y).of_size(tw + 2 * LABEL_PADDING, line_height as u32);
                draw_filled_rect_mut(img, bg, color);
                draw_text_mut(
                    img,
                    Rgb([0, 0, 0]),
                    x + LABEL_PADDING as i32,
                    y,
                    self.scale,
                    font,
                    line,
                );
            }
            y += line_height;
        }
    }
}

impl Default for ImageprocAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAnnotator for ImageprocAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        overlays: &[Overlay],
    ) -> Result<(), Box<dyn std::error::Error>> {
        if overlays.is_empty() {
            return Ok(());
        }
        if frame.channels() != 3 {
            return Err(format!("cannot annotate {}-channel frame", frame.channels()).into());
        }

        let (w, h) = (frame.width(), frame.height());
        let len = frame.data().len();
        let Some(mut img) = FrameCanvas::from_raw(w, h, frame.data_mut()) else {
            return Err(format!("frame buffer of {len} bytes does not match {w}x{h}").into());
        };

        for overlay in overlays {
            self.draw(&mut img, overlay);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use crate::tracking::domain::track_state::TrackStatus;

    fn black_frame(w: u32, h: u32) -> Frame {
        Frame::new(vec![0u8; (w * h * 3) as usize], w, h, 3, 0)
    }

    fn overlay(x1: f64, y1: f64, x2: f64, y2: f64, status: TrackStatus) -> Overlay {
        Overlay {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            lines: vec!["ID: 1".to_string()],
            status,
        }
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width() + x) * 3) as usize;
        [frame.data()[i], frame.data()[i + 1], frame.data()[i + 2]]
    }

    #[test]
    fn test_draws_box_outline_in_status_color() {
        let mut frame = black_frame(64, 48);
        let annotator = ImageprocAnnotator::new();
        annotator
            .annotate(&mut frame, &[overlay(10.0, 10.0, 40.0, 30.0, TrackStatus::Recognized)])
            .unwrap();

        assert_eq!(pixel(&frame, 10, 10), [0, 255, 0]);
        assert_eq!(pixel(&frame, 11, 20), [0, 255, 0]);
        assert_eq!(pixel(&frame, 25, 20), [0, 0, 0], "interior stays untouched");
        assert_eq!(frame.data().len(), 64 * 48 * 3);
    }

    #[test]
    fn test_thickness_draws_nested_outlines() {
        let mut frame = black_frame(64, 48);
        ImageprocAnnotator::new()
            .with_thickness(3)
            .annotate(&mut frame, &[overlay(10.0, 10.0, 40.0, 30.0, TrackStatus::Unknown)])
            .unwrap();

        assert_eq!(pixel(&frame, 12, 20), [255, 0, 0]);
        assert_eq!(pixel(&frame, 13, 20), [0, 0, 0]);
    }

    #[test]
    fn test_no_overlays_leaves_frame_untouched() {
        let mut frame = black_frame(16, 16);
        ImageprocAnnotator::new().annotate(&mut frame, &[]).unwrap();
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_box_outside_frame_is_skipped() {
        let mut frame = black_frame(32, 32);
        ImageprocAnnotator::new()
            .annotate(&mut frame, &[overlay(100.0, 100.0, 120.0, 120.0, TrackStatus::New)])
            .unwrap();
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_box_is_clamped_to_frame_edges() {
        let mut frame = black_frame(32, 32);
        ImageprocAnnotator::new()
            .annotate(&mut frame, &[overlay(-5.0, -5.0, 50.0, 50.0, TrackStatus::Unknown)])
            .unwrap();
        assert_eq!(pixel(&frame, 0, 0), [255, 0, 0]);
        assert_eq!(pixel(&frame, 31, 31), [255, 0, 0]);
    }

    #[test]
    fn test_rejects_non_rgb_frames() {
        let mut frame = Frame::new(vec![9u8; 16], 4, 4, 1, 0);
        let result = ImageprocAnnotator::new()
            .annotate(&mut frame, &[overlay(0.0, 0.0, 2.0, 2.0, TrackStatus::New)]);
        assert!(result.is_err());
        assert_eq!(frame.data(), &[9u8; 16][..], "pixels survive a failed annotate");
    }

    #[test]
    fn test_draws_into_the_frame_buffer_in_place() {
        let mut frame = black_frame(32, 32);
        let buffer = frame.data().as_ptr();
        ImageprocAnnotator::new()
            .annotate(&mut frame, &[overlay(4.0, 4.0, 20.0, 20.0, TrackStatus::New)])
            .unwrap();
        assert_eq!(frame.data().as_ptr(), buffer);
        assert_eq!(frame.data().len(), 32 * 32 * 3);
    }

    #[test]
    fn test_missing_font_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ImageprocAnnotator::new().with_font_file(&dir.path().join("none.ttf"));
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_font_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(ImageprocAnnotator::new().with_font_file(&path).is_err());
    }
}
