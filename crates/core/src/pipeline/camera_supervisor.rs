use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::pipeline::pipeline_executor::{ComponentFactory, PipelineExecutor};
use crate::pipeline::pipeline_logger::{LogPipelineLogger, PipelineLogger};
use crate::pipeline::settings::PipelineSettings;
use crate::pipeline::watch_camera_use_case::{CameraStatus, WatchCameraUseCase};
use crate::shared::camera_config::{CameraConfig, ConfigError};

pub type LoggerFactory = Arc<dyn Fn(&str) -> Box<dyn PipelineLogger> + Send + Sync>;

type StatusMap = Arc<Mutex<BTreeMap<String, CameraStatus>>>;

fn lock(statuses: &StatusMap) -> MutexGuard<'_, BTreeMap<String, CameraStatus>> {
    match statuses.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Runs every configured camera on its own named thread.
///
/// Cameras are isolated: a camera that cannot connect, exhausts its
/// restarts, or panics is reported through its status while the others keep
/// running. All cameras share one cancellation flag.
pub struct CameraSupervisor {
    executor: Arc<dyn PipelineExecutor>,
    factory: Arc<dyn ComponentFactory>,
    settings: PipelineSettings,
    cancelled: Arc<AtomicBool>,
    logger_factory: LoggerFactory,
    statuses: StatusMap,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl CameraSupervisor {
    pub fn new(
        executor: Arc<dyn PipelineExecutor>,
        factory: Arc<dyn ComponentFactory>,
        settings: PipelineSettings,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        let report_every = settings.report_every;
        Self {
            executor,
            factory,
            settings,
            cancelled,
            logger_factory: Arc::new(move |camera_id: &str| -> Box<dyn PipelineLogger> {
                Box::new(LogPipelineLogger::new(camera_id, report_every))
            }),
            statuses: Arc::new(Mutex::new(BTreeMap::new())),
            handles: Vec::new(),
        }
    }

    pub fn with_logger_factory(mut self, factory: LoggerFactory) -> Self {
        self.logger_factory = factory;
        self
    }

    /// Starts one pipeline thread per camera. Camera ids must be unique,
    /// across this call and earlier ones.
    pub fn start(&mut self, cameras: Vec<CameraConfig>) -> Result<(), ConfigError> {
        let mut ids: BTreeSet<String> = self.handles.iter().map(|(id, _)| id.clone()).collect();
        for camera in &cameras {
            if !ids.insert(camera.camera_id().to_string()) {
                return Err(ConfigError::DuplicateCamera(camera.camera_id().to_string()));
            }
        }

        for camera in cameras {
            let id = camera.camera_id().to_string();
            lock(&self.statuses).insert(id.clone(), CameraStatus::Starting);

            let statuses = self.statuses.clone();
            let status_id = id.clone();
            let use_case = WatchCameraUseCase::new(
                camera,
                self.settings.clone(),
                self.factory.clone(),
                self.executor.clone(),
                self.cancelled.clone(),
            )
            .with_status_callback(Box::new(move |status| {
                lock(&statuses).insert(status_id.clone(), status.clone());
            }));
            let mut logger = (self.logger_factory)(&id);

            let spawned = std::thread::Builder::new()
                .name(format!("camera-{id}"))
                .spawn(move || {
                    if let Err(e) = use_case.execute(logger.as_mut()) {
                        log::error!("[{}] Pipeline stopped: {e}", use_case.camera().camera_id());
                    }
                });
            match spawned {
                Ok(handle) => self.handles.push((id, handle)),
                Err(e) => {
                    log::error!("[{id}] Failed to spawn pipeline thread: {e}");
                    lock(&self.statuses).insert(id, CameraStatus::Failed(e.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Current status of every camera.
    pub fn statuses(&self) -> BTreeMap<String, CameraStatus> {
        lock(&self.statuses).clone()
    }

    /// Waits for every pipeline thread and returns the final statuses.
    pub fn wait(self) -> BTreeMap<String, CameraStatus> {
        for (id, handle) in self.handles {
            if handle.join().is_err() {
                log::error!("[{id}] Pipeline thread panicked");
                lock(&self.statuses)
                    .insert(id, CameraStatus::Failed("pipeline thread panicked".into()));
            }
        }
        let statuses = lock(&self.statuses).clone();
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::PipelineError;
    use crate::pipeline::infrastructure::threaded_pipeline_executor::tests::settings;
    use crate::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
    use crate::pipeline::pipeline_executor::{PipelineComponents, RunReport};
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::pipeline::watch_camera_use_case::tests::StubFactory;
    use std::sync::atomic::Ordering;

    fn cam(id: &str, input: &str) -> CameraConfig {
        CameraConfig::new(id, input, format!("rtsp://out/{id}"), ["face"]).unwrap()
    }

    fn null_loggers() -> LoggerFactory {
        Arc::new(|_: &str| -> Box<dyn PipelineLogger> { Box::new(NullPipelineLogger) })
    }

    /// Panics for inputs containing "explode", refuses inputs containing
    /// "offline", and finishes cleanly otherwise.
    struct ByInputExecutor;

    impl PipelineExecutor for ByInputExecutor {
        fn execute(
            &self,
            camera: &CameraConfig,
            _components: PipelineComponents,
            _settings: &PipelineSettings,
            _logger: &mut dyn PipelineLogger,
            _cancelled: &Arc<AtomicBool>,
        ) -> Result<RunReport, PipelineError> {
            if camera.input_url().contains("explode") {
                panic!("decoder crashed");
            }
            if camera.input_url().contains("offline") {
                return Err(PipelineError::StreamUnavailable {
                    url: camera.input_url().to_string(),
                    attempts: 5,
                    reason: "connection refused".into(),
                });
            }
            Ok(RunReport::default())
        }
    }

    fn supervisor(executor: Arc<dyn PipelineExecutor>) -> CameraSupervisor {
        CameraSupervisor::new(
            executor,
            Arc::new(StubFactory::new(3, 0)),
            settings(),
            Arc::new(AtomicBool::new(false)),
        )
        .with_logger_factory(null_loggers())
    }

    #[test]
    fn test_failing_camera_does_not_affect_others() {
        let mut sup = supervisor(Arc::new(ByInputExecutor));
        sup.start(vec![
            cam("lobby", "rtsp://in/lobby"),
            cam("garage", "rtsp://in/offline"),
            cam("roof", "rtsp://in/explode"),
        ])
        .unwrap();

        let statuses = sup.wait();
        assert_eq!(statuses["lobby"], CameraStatus::Stopped);
        assert!(matches!(statuses["garage"], CameraStatus::Unavailable(_)));
        assert!(matches!(statuses["roof"], CameraStatus::Failed(_)));
    }

    #[test]
    fn test_duplicate_camera_ids_are_rejected() {
        let mut sup = supervisor(Arc::new(ByInputExecutor));
        let result = sup.start(vec![cam("a", "rtsp://in/1"), cam("a", "rtsp://in/2")]);
        assert!(matches!(result, Err(ConfigError::DuplicateCamera(id)) if id == "a"));
        assert!(sup.statuses().is_empty(), "nothing started");
    }

    #[test]
    fn test_threaded_cameras_run_to_completion() {
        let mut sup = supervisor(Arc::new(ThreadedPipelineExecutor::new()));
        sup.start(vec![cam("one", "file:///clips/1.mp4"), cam("two", "file:///clips/2.mp4")])
            .unwrap();
        let statuses = sup.wait();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.values().all(|s| *s == CameraStatus::Stopped));
    }

    #[test]
    fn test_shared_cancellation_stops_every_camera() {
        let cancelled = Arc::new(AtomicBool::new(true));
        let mut sup = CameraSupervisor::new(
            Arc::new(ByInputExecutor),
            Arc::new(StubFactory::new(3, 0)),
            settings(),
            cancelled.clone(),
        )
        .with_logger_factory(null_loggers());
        sup.start(vec![cam("a", "rtsp://in/explode"), cam("b", "rtsp://in/offline")])
            .unwrap();
        let statuses = sup.wait();
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(statuses.values().all(|s| *s == CameraStatus::Stopped));
    }
}
