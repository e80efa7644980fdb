use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use crate::pipeline::error::PipelineError;
use crate::pipeline::frame_queue::{frame_queue, FrameConsumer, FrameProducer, QueueItem};
use crate::pipeline::ingestor::Ingestor;
use crate::pipeline::pipeline_executor::{PipelineComponents, PipelineExecutor, RunReport};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::processing_stage::ProcessingStage;
use crate::pipeline::settings::PipelineSettings;
use crate::shared::camera_config::CameraConfig;
use crate::video::domain::stream_writer::StreamWriter;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Executes a camera pipeline with a dedicated ingest thread.
///
/// Layout: `ingest thread → frame queue → calling thread [detect, recognise,
/// annotate, publish]`
///
/// The output is opened once per run, after the first successful input
/// connection. A failure to open or write it ends the run with
/// [`PipelineError::SinkUnavailable`].
pub struct ThreadedPipelineExecutor {
    poll_interval: Duration,
}

impl ThreadedPipelineExecutor {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Default for ThreadedPipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor for ThreadedPipelineExecutor {
    fn execute(
        &self,
        camera: &CameraConfig,
        components: PipelineComponents,
        settings: &PipelineSettings,
        logger: &mut dyn PipelineLogger,
        cancelled: &Arc<AtomicBool>,
    ) -> Result<RunReport, PipelineError> {
        let PipelineComponents {
            reader,
            mut writer,
            detector,
            dispatcher,
            annotator,
            events,
            cache,
        } = components;
        let output_url = camera.output_url();
        let mut stage = ProcessingStage::new(
            camera, settings, detector, dispatcher, annotator, events, cache,
        )?;

        let mut ingestor = Ingestor::new(
            camera.camera_id(),
            camera.input_url(),
            reader,
            settings.connect_retry,
            settings.reconnect_on_eof,
        );
        let Some(metadata) = ingestor.connect(cancelled)? else {
            ingestor.close();
            return Ok(RunReport::default());
        };

        if let Err(e) = writer.open(output_url, &metadata) {
            ingestor.close();
            return Err(sink_error(output_url, e));
        }
        logger.info(&format!(
            "Publishing {}x{} @ {:.1} fps to {output_url}",
            metadata.width,
            metadata.height,
            metadata.effective_fps()
        ));

        let stop = Arc::new(AtomicBool::new(false));
        let (producer, consumer) = frame_queue(settings.queue_capacity, settings.backpressure);
        let ingest_handle = match spawn_ingestor(camera.camera_id(), ingestor, producer, stop.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = writer.close();
                return Err(PipelineError::Setup(format!("failed to spawn ingest thread: {e}")));
            }
        };

        let mut report = RunReport::default();
        let main_result = run_main_loop(
            &consumer,
            &mut stage,
            &mut *writer,
            output_url,
            logger,
            cancelled,
            self.poll_interval,
            &mut report,
        );

        stop.store(true, Ordering::Relaxed);
        stage.shutdown();
        report.frames_dropped = consumer.dropped();
        drop(consumer);

        let result = join_threads(ingest_handle, writer, output_url, main_result.err());
        logger.summary();
        result.map(|()| report)
    }
}

fn sink_error(url: &str, e: Box<dyn std::error::Error>) -> PipelineError {
    PipelineError::SinkUnavailable {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

fn spawn_ingestor(
    camera_id: &str,
    ingestor: Ingestor,
    producer: FrameProducer,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<Result<(), PipelineError>>> {
    std::thread::Builder::new()
        .name(format!("{camera_id}-ingest"))
        .spawn(move || ingestor.run(producer, &stop))
}

/// Runs the processing loop on the calling thread: receive, process,
/// publish, until the queue closes or the run is cancelled.
#[allow(clippy::too_many_arguments)]
fn run_main_loop(
    consumer: &FrameConsumer,
    stage: &mut ProcessingStage,
    writer: &mut dyn StreamWriter,
    output_url: &str,
    logger: &mut dyn PipelineLogger,
    cancelled: &AtomicBool,
    poll_interval: Duration,
    report: &mut RunReport,
) -> Result<(), PipelineError> {
    loop {
        if cancelled.load(Ordering::Relaxed) {
            logger.info("Cancelled");
            return Ok(());
        }

        let item = match consumer.recv_timeout(poll_interval) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };
        logger.metric("queue_depth", consumer.len() as f64);
        logger.metric("dropped_frames", consumer.dropped() as f64);

        let frame = match item {
            QueueItem::EndOfStream { epoch } => {
                logger.info(&format!("Input epoch {epoch} ended, flushing tracks"));
                stage.end_of_stream(epoch);
                continue;
            }
            QueueItem::Frame(frame) => frame,
        };

        let Some(frame) = stage.process(frame, logger)? else {
            report.frames_skipped += 1;
            continue;
        };

        let started = Instant::now();
        writer
            .write(&frame)
            .map_err(|e| sink_error(output_url, e))?;
        logger.timing("publish", started.elapsed().as_secs_f64() * 1000.0);

        report.frames_published += 1;
        logger.progress(report.frames_published);
    }
}

/// Joins the ingest thread, closes the writer, and coalesces the first
/// error encountered.
fn join_threads(
    ingest_handle: JoinHandle<Result<(), PipelineError>>,
    mut writer: Box<dyn StreamWriter>,
    output_url: &str,
    mut first_error: Option<PipelineError>,
) -> Result<(), PipelineError> {
    fn set_if_none(slot: &mut Option<PipelineError>, err: PipelineError) {
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    match ingest_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => set_if_none(&mut first_error, e),
        Err(_) => set_if_none(&mut first_error, PipelineError::Panicked("ingest")),
    }

    if let Err(e) = writer.close() {
        set_if_none(&mut first_error, sink_error(output_url, e));
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
