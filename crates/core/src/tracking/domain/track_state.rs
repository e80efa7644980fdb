use std::time::Duration;

/// Recognition lifecycle of one track.
///
/// Moves forward only: `New -> Recognizing -> {Recognized | Unknown} ->
/// Expired`, plus `Unknown -> Recognized` when a retry succeeds. Any live
/// status may expire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackStatus {
    New,
    Recognizing,
    Recognized,
    Unknown,
    Expired,
}

impl TrackStatus {
    pub fn can_transition_to(self, next: TrackStatus) -> bool {
        use TrackStatus::*;
        matches!(
            (self, next),
            (New, Recognizing)
                | (Recognizing, Recognized)
                | (Recognizing, Unknown)
                | (Unknown, Recognized)
                | (New | Recognizing | Recognized | Unknown, Expired)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackStatus::New => "new",
            TrackStatus::Recognizing => "recognizing",
            TrackStatus::Recognized => "recognized",
            TrackStatus::Unknown => "unknown",
            TrackStatus::Expired => "expired",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackState {
    track_id: u32,
    class_label: String,
    name: Option<String>,
    first_seen: Duration,
    last_seen: Duration,
    status: TrackStatus,
    attempts: u32,
    last_attempt_frame: Option<u64>,
    in_flight: bool,
}

impl TrackState {
    pub(crate) fn new(track_id: u32, class_label: &str, seen_at: Duration) -> Self {
        Self {
            track_id,
            class_label: class_label.to_string(),
            name: None,
            first_seen: seen_at,
            last_seen: seen_at,
            status: TrackStatus::New,
            attempts: 0,
            last_attempt_frame: None,
            in_flight: false,
        }
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn class_label(&self) -> &str {
        &self.class_label
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn first_seen(&self) -> Duration {
        self.first_seen
    }

    pub fn last_seen(&self) -> Duration {
        self.last_seen
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_attempt_frame(&self) -> Option<u64> {
        self.last_attempt_frame
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Time between first and latest sighting.
    pub fn duration(&self) -> Duration {
        self.last_seen.saturating_sub(self.first_seen)
    }

    pub(crate) fn touch(&mut self, seen_at: Duration) {
        if seen_at > self.last_seen {
            self.last_seen = seen_at;
        }
    }

    /// Applies `next` if the state machine allows it.
    pub(crate) fn advance(&mut self, next: TrackStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    pub(crate) fn record_attempt(&mut self, frame_index: u64) {
        self.attempts += 1;
        self.last_attempt_frame = Some(frame_index);
        self.in_flight = true;
    }

    pub(crate) fn finish_attempt(&mut self) {
        self.in_flight = false;
    }

    /// Sets the name once. Later calls are ignored.
    pub(crate) fn assign_name(&mut self, name: &str) -> bool {
        if self.name.is_some() {
            return false;
        }
        self.name = Some(name.to_string());
        true
    }
}
