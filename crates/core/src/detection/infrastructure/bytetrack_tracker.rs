/// Simplified ByteTrack multi-object tracker.
///
/// Two-stage association: high-confidence detections are matched first,
/// then low-confidence detections fill remaining unmatched tracks. Tracks
/// only ever associate with detections of their own class, and ids come
/// from a counter that survives [`ByteTracker::reset`], so an id is never
/// issued twice within one tracker's lifetime.
use std::collections::HashSet;

use crate::shared::bounding_box::BoundingBox;

#[derive(Clone, Debug)]
pub struct TrackerInput {
    pub bbox: BoundingBox,
    pub score: f64,
    pub class_id: usize,
}

#[derive(Clone, Debug)]
pub struct Track {
    pub id: u32,
    pub bbox: BoundingBox,
    pub class_id: usize,
    /// Index into the input slice of the detection matched this frame.
    pub det_index: usize,
}

const HIGH_THRESH: f64 = 0.5;
const MATCH_THRESH: f64 = 0.3;

#[derive(Clone, Debug)]
struct TrackState {
    id: u32,
    bbox: BoundingBox,
    class_id: usize,
    frames_lost: usize,
    det_index: Option<usize>,
}

pub struct ByteTracker {
    tracks: Vec<TrackState>,
    next_id: u32,
    max_lost: usize,
    high_thresh: f64,
}

impl ByteTracker {
    /// `max_lost` is how many consecutive missed frames a track survives
    /// internally before it is dropped.
    pub fn new(max_lost: usize) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            max_lost,
            high_thresh: HIGH_THRESH,
        }
    }

    /// Minimum score for a detection to start a new track.
    pub fn with_high_threshold(mut self, thresh: f64) -> Self {
        self.high_thresh = thresh;
        self
    }

    pub fn update(&mut self, detections: &[TrackerInput]) -> Vec<Track> {
        let (high, low) = split_by_confidence(detections, self.high_thresh);

        for track in &mut self.tracks {
            track.det_index = None;
        }
        let num_existing = self.tracks.len();
        let matched_high = self.associate(&high, detections);
        self.associate(&low, detections);
        self.create_new_tracks(&high, &matched_high, detections);
        self.age_unmatched_tracks(num_existing);

        self.active_tracks()
    }

    /// Drops every live track. The id counter keeps counting.
    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    fn associate(&mut self, dets: &[usize], detections: &[TrackerInput]) -> HashSet<usize> {
        let unmatched: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| self.tracks[i].det_index.is_none())
            .collect();

        let mut matched_det_indices = HashSet::new();
        for (ti, di) in greedy_match(&self.tracks, &unmatched, dets, detections) {
            let track = &mut self.tracks[ti];
            track.bbox = detections[di].bbox;
            track.frames_lost = 0;
            track.det_index = Some(di);
            matched_det_indices.insert(di);
        }
        matched_det_indices
    }

    fn create_new_tracks(
        &mut self,
        high: &[usize],
        matched: &HashSet<usize>,
        detections: &[TrackerInput],
    ) {
        for &di in high {
            if matched.contains(&di) {
                continue;
            }
            self.tracks.push(TrackState {
                id: self.next_id,
                bbox: detections[di].bbox,
                class_id: detections[di].class_id,
                frames_lost: 0,
                det_index: Some(di),
            });
            self.next_id = self.next_id.wrapping_add(1).max(1);
        }
    }

    fn age_unmatched_tracks(&mut self, num_existing: usize) {
        for track in self.tracks.iter_mut().take(num_existing) {
            if track.det_index.is_none() {
                track.frames_lost += 1;
            }
        }
        let max_lost = self.max_lost;
        self.tracks.retain(|t| t.frames_lost <= max_lost);
    }

    /// Only tracks matched this frame produce output.
    fn active_tracks(&self) -> Vec<Track> {
        self.tracks
            .iter()
            .filter_map(|t| {
                t.det_index.map(|det_index| Track {
                    id: t.id,
                    bbox: t.bbox,
                    class_id: t.class_id,
                    det_index,
                })
            })
            .collect()
    }
}

fn split_by_confidence(detections: &[TrackerInput], high_thresh: f64) -> (Vec<usize>, Vec<usize>) {
    (0..detections.len()).partition(|&i| detections[i].score >= high_thresh)
}

/// Greedy IoU matching: pairs sorted by descending IoU, each track and
/// detection used at most once, classes never mixed.
fn greedy_match(
    tracks: &[TrackState],
    track_indices: &[usize],
    det_indices: &[usize],
    detections: &[TrackerInput],
) -> Vec<(usize, usize)> {
    let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
    for &ti in track_indices {
        for &di in det_indices {
            let det = &detections[di];
            if det.class_id != tracks[ti].class_id {
                continue;
            }
            let score = tracks[ti].bbox.iou(&det.bbox);
            if score >= MATCH_THRESH {
                pairs.push((ti, di, score));
            }
        }
    }
    pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut used_tracks = HashSet::new();
    let mut used_dets = HashSet::new();
    let mut matches = Vec::new();

    for (ti, di, _) in pairs {
        if !used_tracks.contains(&ti) && !used_dets.contains(&di) {
            used_tracks.insert(ti);
            used_dets.insert(di);
            matches.push((ti, di));
        }
    }
    matches
}
