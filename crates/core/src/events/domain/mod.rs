pub mod event_sink;
pub mod track_event;
