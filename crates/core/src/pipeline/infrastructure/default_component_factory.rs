use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::annotation::infrastructure::imageproc_annotator::ImageprocAnnotator;
use crate::detection::infrastructure::bytetrack_tracker::ByteTracker;
use crate::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use crate::events::domain::event_sink::{EventSink, MultiEventSink};
use crate::events::infrastructure::http_event_sink::HttpEventSink;
use crate::events::infrastructure::log_event_sink::LogEventSink;
use crate::pipeline::pipeline_executor::{ComponentFactory, PipelineComponents};
use crate::pipeline::settings::PipelineSettings;
use crate::recognition::domain::recognition_dispatcher::{InlineDispatcher, RecognitionDispatcher};
use crate::recognition::domain::recognizer::Recognizer;
use crate::recognition::infrastructure::http_match_client::HttpMatchClient;
use crate::recognition::infrastructure::onnx_embedding_extractor::OnnxEmbeddingExtractor;
use crate::recognition::infrastructure::worker_pool_dispatcher::WorkerPoolDispatcher;
use crate::shared::camera_config::CameraConfig;
use crate::shared::constants::{
    DEFAULT_DETECTION_CONFIDENCE, EVENT_SINK_BACKLOG, EVENT_SINK_TIMEOUT, TRACKER_MAX_LOST,
};
use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;
use crate::video::infrastructure::ffmpeg_writer::FfmpegWriter;

/// Wires the production adapters: FFmpeg in and out, ONNX detection and
/// embedding, the HTTP match service and the event sinks.
///
/// Models are loaded on every `build`, so each restart starts from a fresh
/// tracker and session.
pub struct DefaultComponentFactory {
    detector_model: PathBuf,
    embedding_model: PathBuf,
    class_labels: Vec<String>,
    confidence: f64,
    match_service_url: String,
    event_service_url: Option<String>,
    font: Option<PathBuf>,
    intra_threads: Option<usize>,
}

impl DefaultComponentFactory {
    pub fn new(
        detector_model: PathBuf,
        embedding_model: PathBuf,
        class_labels: Vec<String>,
        match_service_url: impl Into<String>,
    ) -> Self {
        Self {
            detector_model,
            embedding_model,
            class_labels,
            confidence: DEFAULT_DETECTION_CONFIDENCE,
            match_service_url: match_service_url.into(),
            event_service_url: None,
            font: None,
            intra_threads: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_event_service(mut self, url: Option<String>) -> Self {
        self.event_service_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn with_font(mut self, font: Option<PathBuf>) -> Self {
        self.font = font;
        self
    }

    /// Threads each embedding session may use. `None` means all cores.
    pub fn with_intra_threads(mut self, threads: Option<usize>) -> Self {
        self.intra_threads = threads;
        self
    }

    pub fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    fn build_events(&self) -> Result<Box<dyn EventSink>, Box<dyn std::error::Error>> {
        let mut sinks = MultiEventSink::new(vec![Box::new(LogEventSink)]);
        if let Some(url) = &self.event_service_url {
            sinks.push(Box::new(HttpEventSink::new(
                url,
                EVENT_SINK_TIMEOUT,
                EVENT_SINK_BACKLOG,
            )?));
        }
        Ok(Box::new(sinks))
    }

    fn build_annotator(&self) -> Result<Box<dyn FrameAnnotator>, Box<dyn std::error::Error>> {
        let annotator = match &self.font {
            Some(path) => ImageprocAnnotator::new().with_font_file(path)?,
            None => ImageprocAnnotator::new(),
        };
        Ok(Box::new(annotator))
    }
}

impl ComponentFactory for DefaultComponentFactory {
    fn build(
        &self,
        camera: &CameraConfig,
        settings: &PipelineSettings,
    ) -> Result<PipelineComponents, Box<dyn std::error::Error>> {
        camera.check_classes(&self.class_labels)?;

        let detector = OnnxYoloDetector::new(
            &self.detector_model,
            self.class_labels.clone(),
            ByteTracker::new(TRACKER_MAX_LOST),
            self.confidence,
        )?;

        let recognition = &settings.recognition;
        let extractor = Arc::new(OnnxEmbeddingExtractor::new(
            &self.embedding_model,
            recognition.descriptor_len,
            settings.min_crop_size,
            self.intra_threads,
        )?);
        let matcher = Arc::new(HttpMatchClient::new(
            &self.match_service_url,
            recognition.match_timeout,
            recognition.descriptor_len,
        )?);
        let cache = Arc::new(Mutex::new(settings.cache.build()));
        let recognizer = Recognizer::new(extractor, matcher, cache.clone());

        let dispatcher: Box<dyn RecognitionDispatcher> = if recognition.workers == 0 {
            Box::new(InlineDispatcher::new(recognizer))
        } else {
            Box::new(WorkerPoolDispatcher::new(
                recognizer,
                recognition.workers,
                recognition.queue_capacity,
                camera.camera_id(),
            )?)
        };

        let writer = FfmpegWriter::new()
            .with_bitrate(settings.encoder.bitrate_kbps)
            .with_preset(settings.encoder.preset.clone());

        log::debug!(
            "[{}] Components ready: {} recognition worker(s), events to {}",
            camera.camera_id(),
            recognition.workers,
            self.event_service_url.as_deref().unwrap_or("log only"),
        );

        Ok(PipelineComponents {
            reader: Box::new(FfmpegReader::new()),
            writer: Box::new(writer),
            detector: Box::new(detector),
            dispatcher,
            annotator: self.build_annotator()?,
            events: self.build_events()?,
            cache,
        })
    }
}
