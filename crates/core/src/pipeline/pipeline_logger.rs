use std::collections::BTreeMap;
use std::time::Instant;

/// Cross-cutting logger for pipeline orchestration events.
///
/// Decouples the processing loop from specific output mechanisms so callers
/// can observe a camera pipeline without changing the orchestration code.
pub trait PipelineLogger: Send {
    /// Report the number of frames published so far in this run.
    fn progress(&mut self, frames: usize);

    /// Record how long a named pipeline stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. queue depth, active tracks).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Log a recoverable problem.
    fn warn(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events. Used by tests.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _frames: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
    fn warn(&mut self, _message: &str) {}
}

#[derive(Clone, Copy, Debug, Default)]
struct Aggregate {
    count: u64,
    total: f64,
    last: f64,
}

impl Aggregate {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.last = value;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Logger backed by the `log` crate, one per camera.
///
/// Stage timings and metrics are kept as running aggregates so a stream that
/// runs for days uses constant memory. Throughput is reported every
/// `report_every` frames.
pub struct LogPipelineLogger {
    camera_id: String,
    report_every: usize,
    timings: BTreeMap<String, Aggregate>,
    metrics: BTreeMap<String, Aggregate>,
    start_time: Instant,
    window_start: Instant,
    window_frames: usize,
    total_frames: usize,
    reports: usize,
}

impl LogPipelineLogger {
    pub fn new(camera_id: impl Into<String>, report_every: usize) -> Self {
        let now = Instant::now();
        Self {
            camera_id: camera_id.into(),
            report_every: report_every.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            start_time: now,
            window_start: now,
            window_frames: 0,
            total_frames: 0,
            reports: 0,
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.total_frames;
        let mut lines = vec![format!(
            "[{}] Pipeline summary ({frames} frames, {:.1}s total):",
            self.camera_id,
            elapsed_ms / 1000.0
        )];

        for (stage, agg) in &self.timings {
            let pct = if elapsed_ms > 0.0 {
                agg.total / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:18}: avg {:6.1}ms  total {:7.0}ms  ({pct:4.1}%)",
                agg.mean(),
                agg.total
            ));
        }

        for (name, agg) in &self.metrics {
            lines.push(format!("  {name}: avg {:.1}, last {:.0}", agg.mean(), agg.last));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn mean_timing(&self, stage: &str) -> Option<f64> {
        self.timings.get(stage).map(Aggregate::mean)
    }

    pub fn last_metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(|a| a.last)
    }

    pub fn reports(&self) -> usize {
        self.reports
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn progress(&mut self, frames: usize) {
        let delta = frames.saturating_sub(self.total_frames);
        self.total_frames = frames;
        self.window_frames += delta;
        if frames > 0 && frames % self.report_every == 0 {
            let secs = self.window_start.elapsed().as_secs_f64();
            let fps = if secs > 0.0 {
                self.window_frames as f64 / secs
            } else {
                0.0
            };
            log::info!("[{}] Current FPS: {fps:.2} ({frames} frames)", self.camera_id);
            self.window_start = Instant::now();
            self.window_frames = 0;
            self.reports += 1;
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("[{}] {message}", self.camera_id);
    }

    fn warn(&mut self, message: &str) {
        log::warn!("[{}] {message}", self.camera_id);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
