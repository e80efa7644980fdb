use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::time::Duration;

use crate::tracking::domain::track_state::{TrackState, TrackStatus};

/// Result of recording one sighting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sighting {
    /// First sighting; a `New` state was created.
    Entered,
    Updated,
    /// The id belongs to a track that already expired and is ignored.
    Retired,
}

/// The single owner of per-track state for one camera.
///
/// Holds at most one [`TrackState`] per track id. A state leaves the store
/// only through [`TrackStore::mark_expired`], after which its id is retired
/// and never accepted again. The retired set is bounded; the oldest ids are
/// forgotten first.
pub struct TrackStore {
    tracks: BTreeMap<u32, TrackState>,
    retired: HashSet<u32>,
    retired_order: VecDeque<u32>,
    retired_capacity: usize,
}

impl TrackStore {
    pub fn new(retired_capacity: usize) -> Self {
        Self {
            tracks: BTreeMap::new(),
            retired: HashSet::new(),
            retired_order: VecDeque::new(),
            retired_capacity: retired_capacity.max(1),
        }
    }

    /// Records a sighting of `track_id` at stream time `seen_at`.
    pub fn upsert(&mut self, track_id: u32, class_label: &str, seen_at: Duration) -> Sighting {
        if self.retired.contains(&track_id) {
            return Sighting::Retired;
        }
        match self.tracks.get_mut(&track_id) {
            Some(state) => {
                state.touch(seen_at);
                Sighting::Updated
            }
            None => {
                self.tracks
                    .insert(track_id, TrackState::new(track_id, class_label, seen_at));
                Sighting::Entered
            }
        }
    }

    pub fn get(&self, track_id: u32) -> Option<&TrackState> {
        self.tracks.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn snapshot_active_ids(&self) -> BTreeSet<u32> {
        self.tracks.keys().copied().collect()
    }

    /// Marks a recognition attempt as started at `frame_index`. A `New`
    /// track moves to `Recognizing`; an `Unknown` track keeps its status
    /// while the retry is in flight.
    pub fn begin_recognition(&mut self, track_id: u32, frame_index: u64) -> bool {
        let Some(state) = self.tracks.get_mut(&track_id) else {
            return false;
        };
        if state.in_flight() {
            return false;
        }
        let ok = match state.status() {
            TrackStatus::New => state.advance(TrackStatus::Recognizing),
            TrackStatus::Unknown => true,
            _ => false,
        };
        if ok {
            state.record_attempt(frame_index);
        }
        ok
    }

    /// Applies a finished attempt. Returns the new status when it changed.
    ///
    /// A name is frozen once set: later results for a recognised track are
    /// ignored. Results for tracks no longer in the store are dropped.
    pub fn resolve(&mut self, track_id: u32, name: Option<&str>) -> Option<TrackStatus> {
        let state = self.tracks.get_mut(&track_id)?;
        state.finish_attempt();
        match name {
            Some(name) if state.status().can_transition_to(TrackStatus::Recognized) => {
                state.assign_name(name);
                state.advance(TrackStatus::Recognized);
                Some(TrackStatus::Recognized)
            }
            Some(_) => None,
            None => state
                .advance(TrackStatus::Unknown)
                .then_some(TrackStatus::Unknown),
        }
    }

    /// Expires and removes a track, returning its final state.
    pub fn mark_expired(&mut self, track_id: u32) -> Option<TrackState> {
        let mut state = self.tracks.remove(&track_id)?;
        state.advance(TrackStatus::Expired);
        state.finish_attempt();
        self.retire(track_id);
        Some(state)
    }

    /// Expires every track not in `present`, in id order.
    pub fn expire_absent(&mut self, present: &HashSet<u32>) -> Vec<TrackState> {
        let absent: Vec<u32> = self
            .tracks
            .keys()
            .filter(|id| !present.contains(*id))
            .copied()
            .collect();
        absent
            .into_iter()
            .filter_map(|id| self.mark_expired(id))
            .collect()
    }

    /// Expires everything, used when the stream is interrupted.
    pub fn expire_all(&mut self) -> Vec<TrackState> {
        self.expire_absent(&HashSet::new())
    }

    fn retire(&mut self, track_id: u32) {
        if self.retired.insert(track_id) {
            self.retired_order.push_back(track_id);
        }
        while self.retired_order.len() > self.retired_capacity {
            if let Some(old) = self.retired_order.pop_front() {
                self.retired.remove(&old);
            }
        }
    }
}
