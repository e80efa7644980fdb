use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::events::domain::event_sink::EventSink;
use crate::pipeline::error::PipelineError;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::settings::PipelineSettings;
use crate::recognition::domain::embedding_cache::EmbeddingCache;
use crate::recognition::domain::recognition_dispatcher::RecognitionDispatcher;
use crate::shared::camera_config::CameraConfig;
use crate::video::domain::stream_reader::StreamReader;
use crate::video::domain::stream_writer::StreamWriter;

/// Everything one pipeline run consumes. Built fresh for every run so a
/// restart never reuses a dead encoder or stale track state.
pub struct PipelineComponents {
    pub reader: Box<dyn StreamReader>,
    pub writer: Box<dyn StreamWriter>,
    pub detector: Box<dyn ObjectDetector>,
    pub dispatcher: Box<dyn RecognitionDispatcher>,
    pub annotator: Box<dyn FrameAnnotator>,
    pub events: Box<dyn EventSink>,
    pub cache: Arc<Mutex<EmbeddingCache>>,
}

/// Builds the components of a camera pipeline.
pub trait ComponentFactory: Send + Sync {
    fn build(
        &self,
        camera: &CameraConfig,
        settings: &PipelineSettings,
    ) -> Result<PipelineComponents, Box<dyn std::error::Error>>;
}

/// Abstracts how the ingest → process → publish pipeline is executed.
///
/// This is a port (application-layer interface). Infrastructure provides
/// concrete implementations.
pub trait PipelineExecutor: Send + Sync {
    /// Runs until the input ends, `cancelled` is raised, or a fatal error
    /// occurs. Cancellation returns `Ok`.
    fn execute(
        &self,
        camera: &CameraConfig,
        components: PipelineComponents,
        settings: &PipelineSettings,
        logger: &mut dyn PipelineLogger,
        cancelled: &Arc<AtomicBool>,
    ) -> Result<RunReport, PipelineError>;
}

/// Counters of a finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub frames_published: usize,
    pub frames_skipped: usize,
    pub frames_dropped: u64,
}
