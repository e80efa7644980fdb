use crate::events::domain::event_sink::EventSink;
use crate::events::domain::track_event::TrackEvent;

/// Writes each event to the `log` facade at info level.
#[derive(Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &TrackEvent) {
        log::info!(target: "facewatch::events", "{}", event.message());
    }
}
