use crate::shared::frame::Frame;
use crate::shared::stream_metadata::StreamMetadata;

/// Encodes annotated frames and publishes them to an output location.
pub trait StreamWriter: Send {
    fn open(&mut self, url: &str, metadata: &StreamMetadata)
        -> Result<(), Box<dyn std::error::Error>>;

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Flushes the encoder and finalizes the output.
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
