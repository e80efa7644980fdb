use std::time::Duration;

use crate::pipeline::frame_queue::BackpressurePolicy;
use crate::pipeline::retry_policy::ConnectRetryPolicy;
use crate::recognition::domain::embedding_cache::EmbeddingCache;
use crate::shared::camera_config::ConfigError;
use crate::shared::constants::*;
use crate::tracking::domain::recognition_policy::RecognitionPolicy;

#[derive(Clone, Debug)]
pub struct RecognitionSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub match_timeout: Duration,
    pub descriptor_len: usize,
    pub recognizable_classes: Vec<String>,
    /// Frames between attempts for an `Unknown` track.
    pub unknown_retry_interval: usize,
    /// Extra attempts for an `Unknown` track; 0 makes `Unknown` final.
    pub unknown_retry_limit: usize,
}

impl RecognitionSettings {
    pub fn policy(&self) -> Result<RecognitionPolicy, ConfigError> {
        let retry_limit = u32::try_from(self.unknown_retry_limit).map_err(|_| {
            ConfigError::InvalidSetting(format!(
                "unknown retry limit {} exceeds {}",
                self.unknown_retry_limit,
                u32::MAX
            ))
        })?;
        Ok(RecognitionPolicy::new(
            self.recognizable_classes.iter().map(String::as_str),
            self.unknown_retry_interval as u64,
            retry_limit,
        ))
    }
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_RECOGNITION_WORKERS,
            queue_capacity: DEFAULT_RECOGNITION_QUEUE,
            match_timeout: DEFAULT_MATCH_TIMEOUT,
            descriptor_len: DEFAULT_DESCRIPTOR_LEN,
            recognizable_classes: DEFAULT_RECOGNIZABLE_CLASSES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            unknown_retry_interval: DEFAULT_UNKNOWN_RETRY_INTERVAL,
            unknown_retry_limit: DEFAULT_UNKNOWN_RETRY_LIMIT,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheSettings {
    pub capacity: usize,
    pub reuse_window: Duration,
    pub max_distance: f32,
}

impl CacheSettings {
    pub fn build(&self) -> EmbeddingCache {
        EmbeddingCache::new(self.capacity, self.reuse_window, self.max_distance)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            reuse_window: DEFAULT_CACHE_REUSE_WINDOW,
            max_distance: DEFAULT_MATCH_DISTANCE,
        }
    }
}

/// Output encoder knobs. The keyframe interval is always twice the frame
/// rate.
#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub bitrate_kbps: u32,
    pub preset: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            preset: DEFAULT_ENCODER_PRESET.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SupervisionSettings {
    /// Full pipeline restarts allowed after sink failures.
    pub max_restarts: usize,
    pub restart_delay: Duration,
}

impl Default for SupervisionSettings {
    fn default() -> Self {
        Self {
            max_restarts: DEFAULT_MAX_RESTARTS,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

/// Every tunable of one camera pipeline.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub queue_capacity: usize,
    pub backpressure: BackpressurePolicy,
    pub connect_retry: ConnectRetryPolicy,
    /// Reopen a file input after it ends instead of stopping. Live inputs
    /// always reconnect.
    pub reconnect_on_eof: bool,
    pub detection_failure_limit: usize,
    pub crop_padding: f64,
    pub min_crop_size: u32,
    pub report_every: usize,
    pub recognition: RecognitionSettings,
    pub cache: CacheSettings,
    pub encoder: EncoderSettings,
    pub supervision: SupervisionSettings,
}

impl PipelineSettings {
    /// Rejects values that cannot be represented by the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.recognition.policy().map(|_| ())
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: BackpressurePolicy::default(),
            connect_retry: ConnectRetryPolicy::default(),
            reconnect_on_eof: false,
            detection_failure_limit: DEFAULT_DETECTION_FAILURE_LIMIT,
            crop_padding: FACE_CROP_PADDING,
            min_crop_size: MIN_FACE_CROP_SIZE,
            report_every: THROUGHPUT_REPORT_FRAMES,
            recognition: RecognitionSettings::default(),
            cache: CacheSettings::default(),
            encoder: EncoderSettings::default(),
            supervision: SupervisionSettings::default(),
        }
    }
}
