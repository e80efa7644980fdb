use std::collections::BTreeSet;

use crate::detection::domain::detection::Detection;

/// Drops detections whose class is not enabled for the camera, before any
/// tracking state or recognition work is spent on them.
pub fn retain_enabled(detections: &mut Vec<Detection>, enabled: &BTreeSet<String>) {
    detections.retain(|d| enabled.contains(&d.class_label));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;

    fn det(track_id: u32, class: &str) -> Detection {
        Detection {
            track_id,
            class_label: class.to_string(),
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_disabled_classes_are_dropped() {
        let mut dets = vec![det(1, "face"), det(2, "person"), det(3, "face")];
        let enabled = BTreeSet::from(["face".to_string()]);
        retain_enabled(&mut dets, &enabled);
        let ids: Vec<u32> = dets.iter().map(|d| d.track_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_all_enabled_keeps_order() {
        let mut dets = vec![det(4, "person"), det(1, "face")];
        let enabled = BTreeSet::from(["face".to_string(), "person".to_string()]);
        retain_enabled(&mut dets, &enabled);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].track_id, 4);
    }
}
