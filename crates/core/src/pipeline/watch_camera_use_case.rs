use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::pipeline::error::PipelineError;
use crate::pipeline::pipeline_executor::{ComponentFactory, PipelineExecutor, RunReport};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::retry_policy::sleep_unless;
use crate::pipeline::settings::PipelineSettings;
use crate::shared::camera_config::CameraConfig;

/// Externally visible state of one camera pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraStatus {
    Starting,
    Running,
    Restarting { attempt: usize, reason: String },
    /// Finished cleanly: input ended or shutdown was requested.
    Stopped,
    /// The input could not be opened.
    Unavailable(String),
    Failed(String),
}

impl CameraStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CameraStatus::Stopped | CameraStatus::Unavailable(_) | CameraStatus::Failed(_)
        )
    }

    pub(crate) fn from_outcome(outcome: &Result<RunReport, PipelineError>) -> Self {
        match outcome {
            Ok(_) => CameraStatus::Stopped,
            Err(e @ PipelineError::StreamUnavailable { .. }) => {
                CameraStatus::Unavailable(e.to_string())
            }
            Err(e) => CameraStatus::Failed(e.to_string()),
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraStatus::Starting => write!(f, "starting"),
            CameraStatus::Running => write!(f, "running"),
            CameraStatus::Restarting { attempt, reason } => {
                write!(f, "restarting (attempt {attempt}): {reason}")
            }
            CameraStatus::Stopped => write!(f, "stopped"),
            CameraStatus::Unavailable(reason) => write!(f, "unavailable: {reason}"),
            CameraStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

pub type StatusCallback = Box<dyn Fn(&CameraStatus) + Send>;

/// Runs one camera's pipeline under supervision.
///
/// Each run gets freshly built components. A sink failure tears the whole
/// run down and starts a new one, up to the configured restart limit; every
/// other error ends supervision.
pub struct WatchCameraUseCase {
    camera: CameraConfig,
    settings: PipelineSettings,
    factory: Arc<dyn ComponentFactory>,
    executor: Arc<dyn PipelineExecutor>,
    cancelled: Arc<AtomicBool>,
    on_status: Option<StatusCallback>,
}

impl WatchCameraUseCase {
    pub fn new(
        camera: CameraConfig,
        settings: PipelineSettings,
        factory: Arc<dyn ComponentFactory>,
        executor: Arc<dyn PipelineExecutor>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            camera,
            settings,
            factory,
            executor,
            cancelled,
            on_status: None,
        }
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.on_status = Some(callback);
        self
    }

    pub fn camera(&self) -> &CameraConfig {
        &self.camera
    }

    pub fn execute(&self, logger: &mut dyn PipelineLogger) -> Result<RunReport, PipelineError> {
        let outcome = self.supervise(logger);
        self.report(&CameraStatus::from_outcome(&outcome));
        outcome
    }

    fn supervise(&self, logger: &mut dyn PipelineLogger) -> Result<RunReport, PipelineError> {
        let max_restarts = self.settings.supervision.max_restarts;
        let mut total = RunReport::default();
        let mut restarts = 0;

        self.report(&CameraStatus::Starting);
        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Ok(total);
            }

            let components = self
                .factory
                .build(&self.camera, &self.settings)
                .map_err(|e| PipelineError::Setup(e.to_string()))?;

            self.report(&CameraStatus::Running);
            let outcome = self.executor.execute(
                &self.camera,
                components,
                &self.settings,
                logger,
                &self.cancelled,
            );

            match outcome {
                Ok(report) => {
                    accumulate(&mut total, &report);
                    return Ok(total);
                }
                Err(e) if e.is_restartable() && restarts < max_restarts => {
                    restarts += 1;
                    logger.warn(&format!(
                        "{e}; restarting pipeline ({restarts}/{max_restarts})"
                    ));
                    self.report(&CameraStatus::Restarting {
                        attempt: restarts,
                        reason: e.to_string(),
                    });
                    if !sleep_unless(&self.cancelled, self.settings.supervision.restart_delay) {
                        return Ok(total);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn report(&self, status: &CameraStatus) {
        if let Some(callback) = &self.on_status {
            callback(status);
        }
    }
}

fn accumulate(total: &mut RunReport, run: &RunReport) {
    total.frames_published += run.frames_published;
    total.frames_skipped += run.frames_skipped;
    total.frames_dropped += run.frames_dropped;
}
