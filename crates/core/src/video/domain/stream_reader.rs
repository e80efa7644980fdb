use crate::shared::frame::Frame;
use crate::shared::stream_metadata::StreamMetadata;

/// Pulls decoded frames from a live or file source.
///
/// Implementations handle transport and codec details; the pipeline only
/// sees RGB [`Frame`]s and [`StreamMetadata`]. Frames carry the reader's own
/// decode-order index and presentation timestamp; the ingestor restamps them
/// with stream-wide sequence numbers.
pub trait StreamReader: Send {
    /// Connects to the source and returns its metadata.
    fn open(&mut self, url: &str) -> Result<StreamMetadata, Box<dyn std::error::Error>>;

    /// Returns an iterator over frames in decode order. The iterator ends on
    /// end of stream; a read failure is yielded as an `Err` item.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_>;

    /// Releases the connection. Safe to call more than once.
    fn close(&mut self);
}

/// Network sources, whose end of stream means the connection dropped.
pub fn is_live_source(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    ["rtsp://", "rtsps://", "rtmp://", "http://", "https://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}
