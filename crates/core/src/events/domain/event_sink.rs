use crate::events::domain::track_event::TrackEvent;

/// Receives track lifecycle notifications.
///
/// Fire-and-forget: implementations must not block the frame path for long
/// and never report failure to the caller.
pub trait EventSink: Send {
    fn emit(&mut self, event: &TrackEvent);

    /// Delivers anything still buffered. Called once at pipeline shutdown.
    fn flush(&mut self) {}
}

/// Fans every event out to several sinks, in order.
#[derive(Default)]
pub struct MultiEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl MultiEventSink {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for MultiEventSink {
    fn emit(&mut self, event: &TrackEvent) {
        for sink in &mut self.sinks {
            sink.emit(event);
        }
    }

    fn flush(&mut self) {
        for sink in &mut self.sinks {
            sink.flush();
        }
    }
}
