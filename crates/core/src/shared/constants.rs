use std::time::Duration;

/// Single-class face detector; rows carry five trailing keypoints.
pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Classes whose tracks are sent for identity resolution.
pub const DEFAULT_RECOGNIZABLE_CLASSES: &[&str] = &["face"];

pub const DEFAULT_DETECTION_CONFIDENCE: f64 = 0.7;

/// Frames a lost track is kept inside the tracker. Zero retires the id on
/// its first miss, matching the track store's expiry rule.
pub const TRACKER_MAX_LOST: usize = 0;

/// Pixels added around a face box before it is cropped for embedding.
pub const FACE_CROP_PADDING: f64 = 20.0;

/// Crops smaller than this on either side are reported as "no face found".
pub const MIN_FACE_CROP_SIZE: u32 = 16;

/// Length of the descriptor the match service is populated with.
pub const DEFAULT_DESCRIPTOR_LEN: usize = 512;

pub const DEFAULT_QUEUE_CAPACITY: usize = 30;

pub const DEFAULT_CONNECT_ATTEMPTS: usize = 5;
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(3);
pub const MAX_CONNECT_DELAY: Duration = Duration::from_secs(60);

/// Consecutive detector failures tolerated before the pipeline gives up.
pub const DEFAULT_DETECTION_FAILURE_LIMIT: usize = 30;

pub const DEFAULT_MATCH_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_RECOGNITION_WORKERS: usize = 2;
pub const DEFAULT_RECOGNITION_QUEUE: usize = 8;

pub const DEFAULT_UNKNOWN_RETRY_INTERVAL: usize = 15;
pub const DEFAULT_UNKNOWN_RETRY_LIMIT: usize = 3;

pub const DEFAULT_CACHE_CAPACITY: usize = 256;
pub const DEFAULT_CACHE_REUSE_WINDOW: Duration = Duration::from_secs(30);

/// Euclidean distance under which two descriptors are the same face.
pub const DEFAULT_MATCH_DISTANCE: f32 = 0.6;

/// Expired track ids remembered so a tracker cannot resurrect them.
pub const RETIRED_ID_MEMORY: usize = 4096;

pub const FALLBACK_FPS: f64 = 30.0;
pub const DEFAULT_BITRATE_KBPS: u32 = 1024;
pub const DEFAULT_ENCODER_PRESET: &str = "ultrafast";

/// Frames between throughput reports (30 s at 30 fps).
pub const THROUGHPUT_REPORT_FRAMES: usize = 900;

pub const DEFAULT_MAX_RESTARTS: usize = 10;
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Outstanding event deliveries before new events are dropped.
pub const EVENT_SINK_BACKLOG: usize = 256;
pub const EVENT_SINK_TIMEOUT: Duration = Duration::from_secs(2);
/// Time `flush` keeps delivering the backlog before discarding the rest.
pub const EVENT_SINK_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
