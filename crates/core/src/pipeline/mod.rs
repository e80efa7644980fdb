pub mod camera_supervisor;
pub mod error;
pub mod frame_queue;
pub mod infrastructure;
pub mod ingestor;
pub mod pipeline_executor;
pub mod pipeline_logger;
pub mod processing_stage;
pub mod retry_policy;
pub mod settings;
pub mod watch_camera_use_case;
