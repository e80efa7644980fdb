use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use facewatch_core::detection::infrastructure::model_resolver::{self, ModelSource, ProgressFn};
use facewatch_core::pipeline::camera_supervisor::CameraSupervisor;
use facewatch_core::pipeline::frame_queue::BackpressurePolicy;
use facewatch_core::pipeline::infrastructure::default_component_factory::DefaultComponentFactory;
use facewatch_core::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
use facewatch_core::pipeline::retry_policy::ConnectRetryPolicy;
use facewatch_core::pipeline::settings::PipelineSettings;
use facewatch_core::pipeline::watch_camera_use_case::CameraStatus;
use facewatch_core::shared::camera_config::{load_cameras_file, CameraConfig};
use facewatch_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, MAX_CONNECT_DELAY, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};

/// Live face tracking and recognition for RTSP cameras.
#[derive(Parser)]
#[command(name = "facewatch")]
struct Cli {
    /// Camera identity used in logs and events.
    #[arg(long, env = "CAMERA_ID", default_value = "camera")]
    camera_id: String,

    /// Input stream URL.
    #[arg(long, env = "RTSP_IN")]
    input: Option<String>,

    /// Output stream URL.
    #[arg(long, env = "RTSP_OUT")]
    output: Option<String>,

    /// Enabled detection classes (comma-separated).
    #[arg(long, env = "DETECTION_CLASSES", value_delimiter = ',', default_value = "face")]
    classes: Vec<String>,

    /// JSON file listing several cameras; replaces --camera-id/--input/--output/--classes.
    #[arg(long, env = "CAMERAS_FILE")]
    cameras: Option<PathBuf>,

    /// Base URL of the face matching service.
    #[arg(long, env = "MATCH_SERVICE_URL")]
    match_service_url: String,

    /// Base URL of the event logging service. Events are only logged locally when unset.
    #[arg(long, env = "LOGGING_SERVICE_URL")]
    logging_service_url: Option<String>,

    /// Detector model file. Looked up in the model cache or downloaded when omitted.
    #[arg(long, env = "DETECTOR_MODEL")]
    detector_model: Option<PathBuf>,

    /// Embedding model file. Looked up in the model cache or downloaded when omitted.
    #[arg(long, env = "EMBEDDING_MODEL")]
    embedding_model: Option<PathBuf>,

    /// Directory of pre-packaged models searched after the cache.
    #[arg(long, env = "FACEWATCH_MODELS_DIR")]
    models_dir: Option<PathBuf>,

    /// Classes the detector model produces, in output order (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "face")]
    class_labels: Vec<String>,

    /// Detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.7")]
    confidence: f64,

    /// TTF font for box labels. Boxes are drawn without text when unset.
    #[arg(long, env = "ANNOTATION_FONT")]
    font: Option<PathBuf>,

    /// Frames buffered between ingest and processing.
    #[arg(long, default_value = "30")]
    queue_capacity: usize,

    /// Full queue behaviour: block, drop-oldest or drop-newest.
    #[arg(long, default_value = "block")]
    backpressure: BackpressurePolicy,

    /// Input connection attempts before the camera is reported unavailable.
    #[arg(long, default_value = "5")]
    connect_attempts: usize,

    /// Seconds between connection attempts.
    #[arg(long, default_value = "3")]
    connect_delay: u64,

    /// Double the connection delay after every failed attempt.
    #[arg(long)]
    exponential_backoff: bool,

    /// Reopen a file input after it ends instead of stopping (live inputs always reconnect).
    #[arg(long)]
    reconnect_on_eof: bool,

    /// Recognition worker threads per camera (0 = recognise inline).
    #[arg(long, default_value = "2")]
    workers: usize,

    /// Match service timeout in milliseconds.
    #[arg(long, default_value = "1000")]
    match_timeout_ms: u64,

    /// Frames between recognition retries of an unknown face.
    #[arg(long, default_value = "15")]
    unknown_retry_interval: usize,

    /// Extra recognition attempts for an unknown face (0 = never retry).
    #[arg(long, default_value = "3")]
    unknown_retry_limit: usize,

    /// Output bitrate in kbit/s.
    #[arg(long, default_value = "1024")]
    bitrate: u32,

    /// Pipeline restarts allowed after output failures.
    #[arg(long, default_value = "10")]
    max_restarts: usize,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let cameras = build_cameras(&cli)?;
    let settings = build_settings(&cli);
    settings.validate()?;
    let factory = build_factory(&cli)?;
    for camera in &cameras {
        camera.check_classes(factory.class_labels())?;
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    let handler_flag = cancelled.clone();
    ctrlc::set_handler(move || {
        log::info!("Shutdown requested");
        handler_flag.store(true, Ordering::Relaxed);
    })?;

    let mut supervisor = CameraSupervisor::new(
        Arc::new(ThreadedPipelineExecutor::new()),
        Arc::new(factory),
        settings,
        cancelled,
    );
    supervisor.start(cameras)?;

    let statuses = supervisor.wait();
    let mut failed = 0;
    for (camera_id, status) in &statuses {
        log::info!("[{camera_id}] {status}");
        if matches!(status, CameraStatus::Failed(_) | CameraStatus::Unavailable(_)) {
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(format!("{failed} of {} camera(s) did not finish cleanly", statuses.len()).into());
    }
    Ok(())
}

fn build_cameras(cli: &Cli) -> Result<Vec<CameraConfig>, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.cameras {
        let cameras = load_cameras_file(path)?;
        log::info!("Loaded {} camera(s) from {}", cameras.len(), path.display());
        return Ok(cameras);
    }
    let input = cli.input.as_deref().ok_or("--input (or RTSP_IN) is required")?;
    let output = cli.output.as_deref().ok_or("--output (or RTSP_OUT) is required")?;
    let camera = CameraConfig::new(&cli.camera_id, input, output, cli.classes.iter().map(String::as_str))?;
    Ok(vec![camera])
}

fn build_settings(cli: &Cli) -> PipelineSettings {
    let mut settings = PipelineSettings::default();
    let delay = Duration::from_secs(cli.connect_delay);
    settings.queue_capacity = cli.queue_capacity;
    settings.backpressure = cli.backpressure;
    settings.connect_retry = if cli.exponential_backoff {
        ConnectRetryPolicy::exponential(cli.connect_attempts, delay, MAX_CONNECT_DELAY)
    } else {
        ConnectRetryPolicy::fixed(cli.connect_attempts, delay)
    };
    settings.reconnect_on_eof = cli.reconnect_on_eof;
    settings.recognition.workers = cli.workers;
    settings.recognition.match_timeout = Duration::from_millis(cli.match_timeout_ms);
    settings.recognition.unknown_retry_interval = cli.unknown_retry_interval;
    settings.recognition.unknown_retry_limit = cli.unknown_retry_limit;
    settings.encoder.bitrate_kbps = cli.bitrate;
    settings.supervision.max_restarts = cli.max_restarts;
    settings
}

fn build_factory(cli: &Cli) -> Result<DefaultComponentFactory, Box<dyn std::error::Error>> {
    let bundled = cli.models_dir.as_deref();

    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let detector_model = model_resolver::resolve(
        cli.detector_model.as_deref(),
        &ModelSource {
            name: YOLO_MODEL_NAME,
            url: Some(YOLO_MODEL_URL),
        },
        bundled,
        Some(download_progress("face detection")),
    )?;

    log::info!("Resolving model: {EMBEDDING_MODEL_NAME}");
    let embedding_model = model_resolver::resolve(
        cli.embedding_model.as_deref(),
        &ModelSource {
            name: EMBEDDING_MODEL_NAME,
            url: Some(EMBEDDING_MODEL_URL),
        },
        bundled,
        Some(download_progress("embedding")),
    )?;
    log::debug!("Using models {} and {}", detector_model.display(), embedding_model.display());

    let class_labels = cli
        .class_labels
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    Ok(DefaultComponentFactory::new(
        detector_model,
        embedding_model,
        class_labels,
        cli.match_service_url.clone(),
    )
    .with_confidence(cli.confidence)
    .with_event_service(cli.logging_service_url.clone())
    .with_font(cli.font.clone()))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if cli.queue_capacity == 0 {
        return Err("Queue capacity must be at least 1".into());
    }
    if cli.connect_attempts == 0 {
        return Err("Connect attempts must be at least 1".into());
    }
    if cli.match_timeout_ms == 0 {
        return Err("Match timeout must be positive".into());
    }
    if cli.unknown_retry_interval == 0 {
        return Err("Unknown retry interval must be at least 1 frame".into());
    }
    if cli.bitrate == 0 {
        return Err("Bitrate must be positive".into());
    }
    if cli.match_service_url.trim().is_empty() {
        return Err("Match service URL must not be empty".into());
    }
    Ok(())
}

fn download_progress(model: &'static str) -> ProgressFn {
    Box::new(move |downloaded: u64, total: u64| {
        if total > 0 {
            let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
            eprint!("\rDownloading {model} model... {pct}%");
            if downloaded >= total {
                eprintln!();
            }
        } else {
            eprint!("\rDownloading {model} model... {downloaded} bytes");
        }
    })
}
