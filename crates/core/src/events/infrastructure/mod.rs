pub mod http_event_sink;
pub mod log_event_sink;
