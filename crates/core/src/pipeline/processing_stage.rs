use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::annotation::domain::frame_annotator::{FrameAnnotator, Overlay};
use crate::detection::domain::class_filter::retain_enabled;
use crate::detection::domain::detection::Detection;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::events::domain::event_sink::EventSink;
use crate::events::domain::track_event::TrackEvent;
use crate::pipeline::error::PipelineError;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::settings::PipelineSettings;
use crate::recognition::domain::embedding_cache::EmbeddingCache;
use crate::recognition::domain::face_crop::FaceCrop;
use crate::recognition::domain::recognition_dispatcher::RecognitionDispatcher;
use crate::recognition::domain::recognizer::{RecognitionOutcome, RecognitionRequest};
use crate::shared::camera_config::{CameraConfig, ConfigError};
use crate::shared::constants::RETIRED_ID_MEMORY;
use crate::shared::frame::Frame;
use crate::tracking::domain::recognition_policy::RecognitionPolicy;
use crate::tracking::domain::track_state::TrackStatus;
use crate::tracking::domain::track_store::{Sighting, TrackStore};

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Detect, track, recognise and annotate, one frame at a time.
///
/// Sole owner of the camera's [`TrackStore`]. Recognition runs behind a
/// [`RecognitionDispatcher`]; finished results are applied at the start of
/// the next frame, and only if they belong to the current connection epoch.
pub struct ProcessingStage {
    camera_id: String,
    enabled_classes: BTreeSet<String>,
    detector: Box<dyn ObjectDetector>,
    dispatcher: Box<dyn RecognitionDispatcher>,
    annotator: Box<dyn FrameAnnotator>,
    events: Box<dyn EventSink>,
    cache: Arc<Mutex<EmbeddingCache>>,
    store: TrackStore,
    policy: RecognitionPolicy,
    crop_padding: f64,
    min_crop_size: u32,
    failure_limit: usize,
    consecutive_failures: usize,
    epoch: Option<u64>,
}

impl ProcessingStage {
    pub fn new(
        camera: &CameraConfig,
        settings: &PipelineSettings,
        detector: Box<dyn ObjectDetector>,
        dispatcher: Box<dyn RecognitionDispatcher>,
        annotator: Box<dyn FrameAnnotator>,
        events: Box<dyn EventSink>,
        cache: Arc<Mutex<EmbeddingCache>>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            camera_id: camera.camera_id().to_string(),
            enabled_classes: camera.enabled_classes().clone(),
            detector,
            dispatcher,
            annotator,
            events,
            cache,
            store: TrackStore::new(RETIRED_ID_MEMORY),
            policy: settings.recognition.policy()?,
            crop_padding: settings.crop_padding,
            min_crop_size: settings.min_crop_size,
            failure_limit: settings.detection_failure_limit.max(1),
            consecutive_failures: 0,
            epoch: None,
        })
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    /// Runs one frame through the stage. Returns the annotated frame, or
    /// `None` when detection failed and the frame is dropped.
    pub fn process(
        &mut self,
        mut frame: Frame,
        logger: &mut dyn PipelineLogger,
    ) -> Result<Option<Frame>, PipelineError> {
        if self.epoch.is_some_and(|e| e != frame.epoch()) {
            self.flush();
        }
        self.epoch = Some(frame.epoch());

        self.apply_results();

        let started = Instant::now();
        let detected = self.detector.detect(&frame);
        logger.timing("detect", elapsed_ms(started));
        let mut detections = match detected {
            Ok(d) => {
                self.consecutive_failures = 0;
                d
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_limit {
                    return Err(PipelineError::DetectionFailed {
                        failures: self.consecutive_failures,
                        reason: e.to_string(),
                    });
                }
                logger.warn(&format!(
                    "Dropping frame {}: detection failed ({}/{}): {e}",
                    frame.index(),
                    self.consecutive_failures,
                    self.failure_limit
                ));
                return Ok(None);
            }
        };
        retain_enabled(&mut detections, &self.enabled_classes);

        let mut present = HashSet::with_capacity(detections.len());
        for det in &detections {
            match self
                .store
                .upsert(det.track_id, &det.class_label, frame.timestamp())
            {
                Sighting::Retired => continue,
                Sighting::Entered => {
                    if let Some(state) = self.store.get(det.track_id) {
                        self.events.emit(&TrackEvent::enter(&self.camera_id, state));
                    }
                }
                Sighting::Updated => {}
            }
            present.insert(det.track_id);
        }

        let started = Instant::now();
        for det in detections.iter().filter(|d| present.contains(&d.track_id)) {
            self.dispatch(det, &frame);
        }
        logger.timing("recognize_dispatch", elapsed_ms(started));

        for state in self.store.expire_absent(&present) {
            self.lock_cache().evict_track(state.track_id());
            self.events.emit(&TrackEvent::exit(&self.camera_id, &state));
        }

        let overlays: Vec<Overlay> = detections
            .iter()
            .filter(|d| present.contains(&d.track_id))
            .filter_map(|d| {
                self.store
                    .get(d.track_id)
                    .map(|state| Overlay::from_state(d.bbox, state))
            })
            .collect();
        let started = Instant::now();
        if let Err(e) = self.annotator.annotate(&mut frame, &overlays) {
            logger.warn(&format!("Annotation failed on frame {}: {e}", frame.index()));
        }
        logger.timing("annotate", elapsed_ms(started));
        logger.metric("active_tracks", self.store.len() as f64);

        Ok(Some(frame))
    }

    /// Handles the end-of-stream marker of `epoch`. Markers of epochs that
    /// were already flushed are ignored.
    pub fn end_of_stream(&mut self, epoch: u64) {
        if self.epoch.map_or(true, |current| current <= epoch) {
            self.flush();
            self.epoch = None;
        }
    }

    /// Waits for in-flight recognitions, applies them, then expires every
    /// remaining track and flushes the event sink.
    pub fn shutdown(&mut self) {
        self.dispatcher.shutdown();
        self.apply_results();
        self.expire_all();
        self.events.flush();
    }

    fn flush(&mut self) {
        self.expire_all();
        self.detector.reset();
    }

    fn expire_all(&mut self) {
        for state in self.store.expire_all() {
            self.lock_cache().evict_track(state.track_id());
            self.events.emit(&TrackEvent::exit(&self.camera_id, &state));
        }
    }

    fn apply_results(&mut self) {
        for result in self.dispatcher.poll() {
            if Some(result.epoch) != self.epoch {
                log::debug!(
                    "[{}] Dropping recognition result for track {} from epoch {}",
                    self.camera_id,
                    result.track_id,
                    result.epoch
                );
                continue;
            }
            let name = match &result.outcome {
                RecognitionOutcome::Recognized(name) => Some(name.as_str()),
                RecognitionOutcome::NoMatch | RecognitionOutcome::NoFace => None,
            };
            self.resolve(result.track_id, name);
        }
    }

    fn resolve(&mut self, track_id: u32, name: Option<&str>) {
        if self.store.resolve(track_id, name) == Some(TrackStatus::Recognized) {
            if let Some(event) = self
                .store
                .get(track_id)
                .and_then(|state| TrackEvent::recognized(&self.camera_id, state))
            {
                self.events.emit(&event);
            }
        }
    }

    fn dispatch(&mut self, det: &Detection, frame: &Frame) {
        let frame_index = frame.index() as u64;
        let Some(state) = self.store.get(det.track_id) else {
            return;
        };
        if !self.policy.should_attempt(state, frame_index) {
            return;
        }

        let cached = self.lock_cache().lookup_track(det.track_id);
        if let Some(name) = cached {
            if self.store.begin_recognition(det.track_id, frame_index) {
                self.resolve(det.track_id, Some(&name));
            }
            return;
        }

        let Some(crop) =
            FaceCrop::from_frame(frame, &det.bbox, self.crop_padding, self.min_crop_size)
        else {
            if self.store.begin_recognition(det.track_id, frame_index) {
                self.resolve(det.track_id, None);
            }
            return;
        };

        let request = RecognitionRequest {
            track_id: det.track_id,
            epoch: frame.epoch(),
            crop,
        };
        match self.dispatcher.submit(request) {
            Ok(()) => {
                self.store.begin_recognition(det.track_id, frame_index);
            }
            Err(rejected) => log::debug!(
                "[{}] Recognition queue full, track {} waits for a later frame",
                self.camera_id,
                rejected.track_id
            ),
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, EmbeddingCache> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
