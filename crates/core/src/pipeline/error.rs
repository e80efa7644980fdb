use thiserror::Error;

use crate::shared::camera_config::ConfigError;

/// Failures that end one pipeline run for a camera.
///
/// There is no recognition variant: the match client collapses those failures
/// to "no match". A cancelled run returns `Ok`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input stream {url} unavailable after {attempts} attempt(s): {reason}")]
    StreamUnavailable {
        url: String,
        attempts: usize,
        reason: String,
    },

    #[error("output sink {url} unavailable: {reason}")]
    SinkUnavailable { url: String, reason: String },

    #[error("detector failed on {failures} consecutive frames, last error: {reason}")]
    DetectionFailed { failures: usize, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to set up pipeline components: {0}")]
    Setup(String),

    #[error("{0} thread panicked")]
    Panicked(&'static str),
}

impl PipelineError {
    /// Whether a fresh run of the whole pipeline may recover.
    pub fn is_restartable(&self) -> bool {
        matches!(self, PipelineError::SinkUnavailable { .. })
    }
}
