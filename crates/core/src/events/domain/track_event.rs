use std::time::Duration;

use chrono::{DateTime, Local};

use crate::tracking::domain::track_state::TrackState;

#[derive(Clone, Debug, PartialEq)]
pub enum TrackEventKind {
    Enter,
    Recognized { name: String },
    Exit { name: Option<String>, duration: Duration },
}

/// Lifecycle notification for one track on one camera.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackEvent {
    pub camera_id: String,
    pub track_id: u32,
    pub class_label: String,
    pub kind: TrackEventKind,
    pub at: DateTime<Local>,
}

impl TrackEvent {
    pub fn enter(camera_id: &str, state: &TrackState) -> Self {
        Self::new(camera_id, state, TrackEventKind::Enter)
    }

    /// `None` when the track has no name yet.
    pub fn recognized(camera_id: &str, state: &TrackState) -> Option<Self> {
        let name = state.name()?.to_string();
        Some(Self::new(camera_id, state, TrackEventKind::Recognized { name }))
    }

    pub fn exit(camera_id: &str, state: &TrackState) -> Self {
        Self::new(
            camera_id,
            state,
            TrackEventKind::Exit {
                name: state.name().map(str::to_string),
                duration: state.duration(),
            },
        )
    }

    fn new(camera_id: &str, state: &TrackState, kind: TrackEventKind) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            track_id: state.track_id(),
            class_label: state.class_label().to_string(),
            kind,
            at: Local::now(),
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self.kind {
            TrackEventKind::Enter => "enter",
            TrackEventKind::Recognized { .. } => "recognized",
            TrackEventKind::Exit { .. } => "exit",
        }
    }

    /// Human-readable line for the log service.
    pub fn message(&self) -> String {
        let stamp = self.at.format("%Y-%m-%d %H:%M:%S");
        let subject = if self.class_label == "face" {
            "Person".to_string()
        } else {
            capitalize(&self.class_label)
        };
        let body = match &self.kind {
            TrackEventKind::Enter => {
                format!("{subject} {} entered the frame", self.track_id)
            }
            TrackEventKind::Recognized { name } => {
                format!("Recognized person: {name} (ID: {})", self.track_id)
            }
            TrackEventKind::Exit { name, duration } => {
                let who = name
                    .clone()
                    .unwrap_or_else(|| self.track_id.to_string());
                format!(
                    "{subject} {who} left the frame. Time in frame: {:.1} s",
                    duration.as_secs_f64()
                )
            }
        };
        format!("[{}] {stamp} - {body}", self.camera_id)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::domain::track_store::TrackStore;

    fn recognized_store() -> TrackStore {
        let mut store = TrackStore::new(8);
        store.upsert(7, "face", Duration::from_millis(0));
        store.upsert(7, "face", Duration::from_millis(2500));
        store.begin_recognition(7, 0);
        store.resolve(7, Some("Alice"));
        store
    }

    #[test]
    fn test_enter_message() {
        let mut store = TrackStore::new(8);
        store.upsert(3, "person", Duration::ZERO);
        let event = TrackEvent::enter("lobby", store.get(3).unwrap());
        assert_eq!(event.kind_str(), "enter");
        let msg = event.message();
        assert!(msg.starts_with("[lobby] "));
        assert!(msg.ends_with("Person 3 entered the frame"));
    }

    #[test]
    fn test_recognized_message_names_the_person() {
        let store = recognized_store();
        let event = TrackEvent::recognized("lobby", store.get(7).unwrap()).unwrap();
        assert!(event.message().ends_with("Recognized person: Alice (ID: 7)"));
    }

    #[test]
    fn test_recognized_requires_a_name() {
        let mut store = TrackStore::new(8);
        store.upsert(1, "face", Duration::ZERO);
        assert!(TrackEvent::recognized("lobby", store.get(1).unwrap()).is_none());
    }

    #[test]
    fn test_exit_carries_duration() {
        let mut store = recognized_store();
        let state = store.mark_expired(7).unwrap();
        let event = TrackEvent::exit("gate", &state);
        assert_eq!(
            event.kind,
            TrackEventKind::Exit {
                name: Some("Alice".into()),
                duration: Duration::from_millis(2500)
            }
        );
        assert!(event
            .message()
            .ends_with("Person Alice left the frame. Time in frame: 2.5 s"));
    }

    #[test]
    fn test_exit_of_unknown_uses_track_id() {
        let mut store = TrackStore::new(8);
        store.upsert(12, "face", Duration::ZERO);
        let state = store.mark_expired(12).unwrap();
        assert!(TrackEvent::exit("gate", &state)
            .message()
            .contains("Person 12 left the frame"));
    }
}
