use std::collections::BTreeSet;

use crate::tracking::domain::track_state::{TrackState, TrackStatus};

/// Decides when a track should be sent for recognition.
///
/// Only classes in `recognizable` are ever recognised; other enabled classes
/// are tracked but stay `New`. A `New` track is attempted as soon as it is
/// seen. An `Unknown` track is retried every `retry_interval` frames, at most
/// `retry_limit` times after the first attempt; a limit of 0 makes `Unknown`
/// final.
#[derive(Clone, Debug)]
pub struct RecognitionPolicy {
    recognizable: BTreeSet<String>,
    retry_interval: u64,
    retry_limit: u32,
}

impl RecognitionPolicy {
    pub fn new(
        recognizable: impl IntoIterator<Item = impl Into<String>>,
        retry_interval: u64,
        retry_limit: u32,
    ) -> Self {
        Self {
            recognizable: recognizable.into_iter().map(Into::into).collect(),
            retry_interval: retry_interval.max(1),
            retry_limit,
        }
    }

    pub fn is_recognizable(&self, class_label: &str) -> bool {
        self.recognizable.contains(class_label)
    }

    pub fn recognizable(&self) -> &BTreeSet<String> {
        &self.recognizable
    }

    pub fn should_attempt(&self, state: &TrackState, frame_index: u64) -> bool {
        if state.in_flight() || !self.is_recognizable(state.class_label()) {
            return false;
        }
        match state.status() {
            TrackStatus::New => true,
            TrackStatus::Unknown => {
                let retries_used = state.attempts().saturating_sub(1);
                let due = state
                    .last_attempt_frame()
                    .map_or(true, |last| frame_index.saturating_sub(last) >= self.retry_interval);
                retries_used < self.retry_limit && due
            }
            TrackStatus::Recognizing | TrackStatus::Recognized | TrackStatus::Expired => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy(limit: u32) -> RecognitionPolicy {
        RecognitionPolicy::new(["face"], 15, limit)
    }

    fn unknown_after_attempt(at_frame: u64) -> TrackState {
        let mut s = TrackState::new(1, "face", Duration::ZERO);
        s.advance(TrackStatus::Recognizing);
        s.record_attempt(at_frame);
        s.finish_attempt();
        s.advance(TrackStatus::Unknown);
        s
    }

    #[test]
    fn test_new_face_is_attempted_immediately() {
        let s = TrackState::new(1, "face", Duration::ZERO);
        assert!(policy(3).should_attempt(&s, 0));
    }

    #[test]
    fn test_unrecognizable_class_is_never_attempted() {
        let s = TrackState::new(1, "person", Duration::ZERO);
        assert!(!policy(3).should_attempt(&s, 0));
    }

    #[test]
    fn test_in_flight_track_is_not_resubmitted() {
        let mut s = TrackState::new(1, "face", Duration::ZERO);
        s.advance(TrackStatus::Recognizing);
        s.record_attempt(0);
        assert!(!policy(3).should_attempt(&s, 100));
    }

    #[test]
    fn test_unknown_retry_waits_for_interval() {
        let s = unknown_after_attempt(10);
        let p = policy(3);
        assert!(!p.should_attempt(&s, 24));
        assert!(p.should_attempt(&s, 25));
    }

    #[test]
    fn test_retry_limit_is_respected() {
        let p = policy(2);
        let mut s = unknown_after_attempt(0);
        s.record_attempt(15);
        s.finish_attempt();
        assert!(p.should_attempt(&s, 30));
        s.record_attempt(30);
        s.finish_attempt();
        assert!(!p.should_attempt(&s, 1000));
    }

    #[test]
    fn test_zero_limit_makes_unknown_final() {
        assert!(!policy(0).should_attempt(&unknown_after_attempt(0), 1000));
    }
}
