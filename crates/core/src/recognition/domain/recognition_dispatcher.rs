use crate::recognition::domain::recognizer::{RecognitionRequest, RecognitionResult, Recognizer};

/// Hands recognition work off the frame path and returns results later.
///
/// The processing stage submits a request when a track needs a name and
/// polls for finished results once per frame, applying them to the track
/// store itself. No implementation touches track state.
pub trait RecognitionDispatcher: Send {
    /// Queues a request. Returns it back when the dispatcher is saturated so
    /// the caller can retry on a later frame.
    fn submit(&mut self, request: RecognitionRequest) -> Result<(), RecognitionRequest>;

    /// Results finished since the last poll, in completion order.
    fn poll(&mut self) -> Vec<RecognitionResult>;

    /// Stops accepting work and waits for in-flight requests to finish or
    /// time out. Their results stay available to one last `poll`.
    fn shutdown(&mut self) {}
}

/// Runs recognition synchronously inside `submit`.
///
/// Results are still delivered through `poll`, so the processing stage
/// behaves identically with either dispatcher.
pub struct InlineDispatcher {
    recognizer: Recognizer,
    ready: Vec<RecognitionResult>,
}

impl InlineDispatcher {
    pub fn new(recognizer: Recognizer) -> Self {
        Self {
            recognizer,
            ready: Vec::new(),
        }
    }
}

impl RecognitionDispatcher for InlineDispatcher {
    fn submit(&mut self, request: RecognitionRequest) -> Result<(), RecognitionRequest> {
        self.ready.push(self.recognizer.recognize(&request));
        Ok(())
    }

    fn poll(&mut self) -> Vec<RecognitionResult> {
        std::mem::take(&mut self.ready)
    }
}
