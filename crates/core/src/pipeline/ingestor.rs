use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::pipeline::error::PipelineError;
use crate::pipeline::frame_queue::{FrameProducer, PushError};
use crate::pipeline::retry_policy::{sleep_unless, ConnectRetryPolicy};
use crate::shared::stream_metadata::StreamMetadata;
use crate::video::domain::stream_reader::{is_live_source, StreamReader};

enum ReadEnd {
    Eof,
    Failed(String),
    Stopped,
    Closed,
}

/// Reads frames from one input URL and feeds the frame queue.
///
/// Every successful connection starts a new epoch. Frames are restamped with
/// a sequence number that keeps increasing across reconnects and a
/// timestamp that never goes backwards. When a connection ends the ingestor
/// queues an end-of-stream marker for that epoch, then reconnects under the
/// retry policy. A live source that reaches end of stream has dropped and is
/// always reconnected; a file only when `reconnect_on_eof` is set.
pub struct Ingestor {
    camera_id: String,
    url: String,
    reader: Box<dyn StreamReader>,
    retry: ConnectRetryPolicy,
    reconnect_on_eof: bool,
    live: bool,
    connected: bool,
    epoch: u64,
    next_index: usize,
    started: Instant,
    last_timestamp: Duration,
}

impl Ingestor {
    pub fn new(
        camera_id: impl Into<String>,
        url: impl Into<String>,
        reader: Box<dyn StreamReader>,
        retry: ConnectRetryPolicy,
        reconnect_on_eof: bool,
    ) -> Self {
        let url = url.into();
        Self {
            camera_id: camera_id.into(),
            live: is_live_source(&url),
            url,
            reader,
            retry,
            reconnect_on_eof,
            connected: false,
            epoch: 0,
            next_index: 0,
            started: Instant::now(),
            last_timestamp: Duration::ZERO,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Releases the input without running.
    pub fn close(mut self) {
        self.reader.close();
    }

    /// Opens the input, retrying per policy. Returns `Ok(None)` if `stop`
    /// is raised while waiting.
    pub fn connect(&mut self, stop: &AtomicBool) -> Result<Option<StreamMetadata>, PipelineError> {
        let max = self.retry.max_attempts();
        let mut last_error = String::new();

        for attempt in 1..=max {
            if stop.load(Ordering::Relaxed) {
                return Ok(None);
            }
            match self.reader.open(&self.url) {
                Ok(metadata) => {
                    self.epoch += 1;
                    self.connected = true;
                    log::info!(
                        "[{}] Connected to {} ({}x{} @ {:.1} fps, {}), epoch {}",
                        self.camera_id,
                        self.url,
                        metadata.width,
                        metadata.height,
                        metadata.effective_fps(),
                        metadata.codec,
                        self.epoch
                    );
                    return Ok(Some(metadata));
                }
                Err(e) => {
                    last_error = e.to_string();
                    log::warn!(
                        "[{}] Failed to open {} (attempt {attempt}/{max}): {e}",
                        self.camera_id,
                        self.url
                    );
                    if attempt < max && !sleep_unless(stop, self.retry.delay_after(attempt)) {
                        return Ok(None);
                    }
                }
            }
        }

        Err(PipelineError::StreamUnavailable {
            url: self.url.clone(),
            attempts: max,
            reason: last_error,
        })
    }

    /// Pumps frames until the source is exhausted, `stop` is raised, or a
    /// reconnect gives up. Connects first if [`Ingestor::connect`] has not
    /// been called.
    pub fn run(mut self, producer: FrameProducer, stop: &AtomicBool) -> Result<(), PipelineError> {
        let result = self.run_loop(&producer, stop);
        self.reader.close();
        result
    }

    fn run_loop(&mut self, producer: &FrameProducer, stop: &AtomicBool) -> Result<(), PipelineError> {
        loop {
            if !self.connected && self.connect(stop)?.is_none() {
                return Ok(());
            }

            let end = self.pump(producer, stop);
            self.reader.close();
            self.connected = false;

            match end {
                ReadEnd::Stopped | ReadEnd::Closed => return Ok(()),
                ReadEnd::Eof if self.live => {
                    log::warn!(
                        "[{}] Live stream {} ended; reconnecting",
                        self.camera_id,
                        self.url
                    );
                }
                ReadEnd::Eof => {
                    log::info!("[{}] End of stream on {}", self.camera_id, self.url);
                }
                ReadEnd::Failed(reason) => {
                    log::warn!(
                        "[{}] Read from {} failed: {reason}; reconnecting",
                        self.camera_id,
                        self.url
                    );
                }
            }

            if producer.push_end_of_stream(self.epoch, stop).is_err() {
                return Ok(());
            }
            if matches!(end, ReadEnd::Eof) && !self.live && !self.reconnect_on_eof {
                return Ok(());
            }
        }
    }

    fn pump(&mut self, producer: &FrameProducer, stop: &AtomicBool) -> ReadEnd {
        let epoch = self.epoch;
        let base = self.started.elapsed().max(self.last_timestamp);
        let mut origin: Option<Duration> = None;

        for item in self.reader.frames() {
            if stop.load(Ordering::Relaxed) {
                return ReadEnd::Stopped;
            }
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => return ReadEnd::Failed(e.to_string()),
            };

            let pts = frame.timestamp();
            let first = *origin.get_or_insert(pts);
            let timestamp = (base + pts.saturating_sub(first)).max(self.last_timestamp);
            self.last_timestamp = timestamp;

            let index = self.next_index;
            self.next_index += 1;

            match producer.push_frame(frame.stamped(index, epoch, timestamp), stop) {
                Ok(()) => {}
                Err(PushError::Stopped) => return ReadEnd::Stopped,
                Err(PushError::Closed) => return ReadEnd::Closed,
            }
        }
        ReadEnd::Eof
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::frame_queue::{frame_queue, BackpressurePolicy, FrameConsumer, QueueItem};
    use crate::pipeline::settings::PipelineSettings;
    use crate::shared::frame::Frame;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    pub(crate) const FRAME_SIZE: u32 = 64;
    pub(crate) const FRAME_INTERVAL: Duration = Duration::from_millis(40);

    /// One connection attempt of a [`ScriptedReader`].
    #[derive(Clone, Copy, Debug)]
    pub(crate) enum Session {
        Refuse,
        /// Opens and yields `count` frames, then ends or fails.
        Frames { count: usize, then_fail: bool },
    }

    /// Replays a fixed list of connection sessions. Once the list is used
    /// up, `open` fails.
    pub(crate) struct ScriptedReader {
        sessions: VecDeque<Session>,
        current: Option<(usize, bool)>,
        pub opens: Arc<AtomicUsize>,
        pub closes: Arc<AtomicUsize>,
    }

    impl ScriptedReader {
        pub(crate) fn new(sessions: Vec<Session>) -> Self {
            Self {
                sessions: sessions.into(),
                current: None,
                opens: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    pub(crate) fn test_frame(index: usize) -> Frame {
        let n = (FRAME_SIZE * FRAME_SIZE * 3) as usize;
        Frame::new(vec![200u8; n], FRAME_SIZE, FRAME_SIZE, 3, index).stamped(
            index,
            0,
            FRAME_INTERVAL * index as u32,
        )
    }

    impl StreamReader for ScriptedReader {
        fn open(&mut self, url: &str) -> Result<StreamMetadata, Box<dyn std::error::Error>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            match self.sessions.pop_front() {
                Some(Session::Frames { count, then_fail }) => {
                    self.current = Some((count, then_fail));
                    Ok(StreamMetadata {
                        width: FRAME_SIZE,
                        height: FRAME_SIZE,
                        fps: 25.0,
                        codec: "h264".into(),
                        source_url: url.to_string(),
                    })
                }
                Some(Session::Refuse) => Err("connection refused".into()),
                None => Err("source gone".into()),
            }
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            let (count, then_fail) = self.current.take().unwrap_or((0, false));
            let frames = (0..count).map(|i| Ok(test_frame(i)));
            let tail = then_fail
                .then(|| Err::<Frame, Box<dyn std::error::Error>>("connection reset".into()));
            Box::new(frames.chain(tail))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn quick_retry(attempts: usize) -> ConnectRetryPolicy {
        ConnectRetryPolicy::fixed(attempts, Duration::from_millis(1))
    }

    fn collect(consumer: &FrameConsumer) -> Vec<QueueItem> {
        let mut items = Vec::new();
        while let Ok(item) = consumer.recv_timeout(Duration::from_millis(10)) {
            items.push(item);
        }
        items
    }

    fn describe(items: &[QueueItem]) -> Vec<String> {
        items
            .iter()
            .map(|item| match item {
                QueueItem::Frame(f) => format!("F{}@{}", f.index(), f.epoch()),
                QueueItem::EndOfStream { epoch } => format!("EOS@{epoch}"),
            })
            .collect()
    }

    #[test]
    fn test_connect_retries_until_open() {
        let reader = ScriptedReader::new(vec![
            Session::Refuse,
            Session::Refuse,
            Session::Frames { count: 1, then_fail: false },
        ]);
        let opens = reader.opens.clone();
        let mut ingestor = Ingestor::new("cam", "rtsp://in", Box::new(reader), quick_retry(5), false);

        let metadata = ingestor.connect(&AtomicBool::new(false)).unwrap().unwrap();
        assert_eq!(metadata.width, FRAME_SIZE);
        assert_eq!(opens.load(Ordering::SeqCst), 3);
        assert_eq!(ingestor.epoch(), 1);
    }

    #[test]
    fn test_connect_gives_up_after_max_attempts() {
        let reader = ScriptedReader::new(vec![Session::Refuse, Session::Refuse, Session::Refuse]);
        let opens = reader.opens.clone();
        let mut ingestor = Ingestor::new("cam", "rtsp://in", Box::new(reader), quick_retry(2), false);

        match ingestor.connect(&AtomicBool::new(false)) {
            Err(PipelineError::StreamUnavailable { url, attempts, reason }) => {
                assert_eq!(url, "rtsp://in");
                assert_eq!(attempts, 2);
                assert!(reason.contains("refused"));
            }
            other => panic!("expected StreamUnavailable, got {other:?}"),
        }
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_connect_returns_none_when_stopped() {
        let reader = ScriptedReader::new(vec![Session::Refuse]);
        let mut ingestor = Ingestor::new("cam", "rtsp://in", Box::new(reader), quick_retry(5), false);
        assert!(ingestor.connect(&AtomicBool::new(true)).unwrap().is_none());
    }

    #[test]
    fn test_reconnect_after_read_failure_starts_new_epoch() {
        let reader = ScriptedReader::new(vec![
            Session::Frames { count: 3, then_fail: true },
            Session::Frames { count: 2, then_fail: false },
        ]);
        let ingestor =
            Ingestor::new("cam", "file:///clips/lobby.mp4", Box::new(reader), quick_retry(3), false);
        let (producer, consumer) = frame_queue(16, BackpressurePolicy::Block);

        ingestor.run(producer, &AtomicBool::new(false)).unwrap();

        let items = collect(&consumer);
        assert_eq!(
            describe(&items),
            vec!["F0@1", "F1@1", "F2@1", "EOS@1", "F3@2", "F4@2", "EOS@2"]
        );
    }

    #[test]
    fn test_timestamps_never_go_backwards_across_reconnects() {
        let reader = ScriptedReader::new(vec![
            Session::Frames { count: 4, then_fail: true },
            Session::Frames { count: 4, then_fail: false },
        ]);
        let ingestor =
            Ingestor::new("cam", "file:///clips/lobby.mp4", Box::new(reader), quick_retry(3), false);
        let (producer, consumer) = frame_queue(16, BackpressurePolicy::Block);
        ingestor.run(producer, &AtomicBool::new(false)).unwrap();

        let stamps: Vec<Duration> = collect(&consumer)
            .into_iter()
            .filter_map(|item| match item {
                QueueItem::Frame(f) => Some(f.timestamp()),
                QueueItem::EndOfStream { .. } => None,
            })
            .collect();
        assert_eq!(stamps.len(), 8);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_failed_reconnect_is_fatal_after_flush_marker() {
        let reader = ScriptedReader::new(vec![
            Session::Frames { count: 2, then_fail: true },
            Session::Refuse,
            Session::Refuse,
        ]);
        let closes = reader.closes.clone();
        let ingestor = Ingestor::new("cam", "rtsp://in", Box::new(reader), quick_retry(2), false);
        let (producer, consumer) = frame_queue(16, BackpressurePolicy::Block);

        let result = ingestor.run(producer, &AtomicBool::new(false));
        assert!(matches!(result, Err(PipelineError::StreamUnavailable { .. })));
        assert_eq!(describe(&collect(&consumer)), vec!["F0@1", "F1@1", "EOS@1"]);
        assert!(closes.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_eof_reconnects_when_enabled() {
        let reader = ScriptedReader::new(vec![
            Session::Frames { count: 1, then_fail: false },
            Session::Frames { count: 1, then_fail: false },
        ]);
        let ingestor = Ingestor::new("cam", "file.mp4", Box::new(reader), quick_retry(1), true);
        let (producer, consumer) = frame_queue(16, BackpressurePolicy::Block);

        let result = ingestor.run(producer, &AtomicBool::new(false));
        assert!(matches!(result, Err(PipelineError::StreamUnavailable { .. })));
        assert_eq!(
            describe(&collect(&consumer)),
            vec!["F0@1", "EOS@1", "F1@2", "EOS@2"]
        );
    }

    #[test]
    fn test_live_stream_end_reconnects_with_new_epoch() {
        let reader = ScriptedReader::new(vec![
            Session::Frames { count: 2, then_fail: false },
            Session::Frames { count: 1, then_fail: false },
        ]);
        let opens = reader.opens.clone();
        let defaults = PipelineSettings::default();
        let ingestor = Ingestor::new(
            "cam",
            "rtsp://cam.local/stream",
            Box::new(reader),
            quick_retry(1),
            defaults.reconnect_on_eof,
        );
        let (producer, consumer) = frame_queue(16, BackpressurePolicy::Block);

        let result = ingestor.run(producer, &AtomicBool::new(false));
        assert!(matches!(result, Err(PipelineError::StreamUnavailable { .. })));
        assert_eq!(
            describe(&collect(&consumer)),
            vec!["F0@1", "F1@1", "EOS@1", "F2@2", "EOS@2"]
        );
        assert_eq!(opens.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_file_end_stops_without_reconnect() {
        let reader = ScriptedReader::new(vec![
            Session::Frames { count: 2, then_fail: false },
            Session::Frames { count: 2, then_fail: false },
        ]);
        let opens = reader.opens.clone();
        let ingestor = Ingestor::new(
            "cam",
            "file:///clips/lobby.mp4",
            Box::new(reader),
            quick_retry(1),
            PipelineSettings::default().reconnect_on_eof,
        );
        let (producer, consumer) = frame_queue(16, BackpressurePolicy::Block);

        assert!(ingestor.run(producer, &AtomicBool::new(false)).is_ok());
        assert_eq!(describe(&collect(&consumer)), vec!["F0@1", "F1@1", "EOS@1"]);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_ends_run_cleanly() {
        let reader = ScriptedReader::new(vec![Session::Frames { count: 100, then_fail: false }]);
        let ingestor = Ingestor::new("cam", "rtsp://in", Box::new(reader), quick_retry(1), false);
        let (producer, consumer) = frame_queue(16, BackpressurePolicy::Block);

        assert!(ingestor.run(producer, &AtomicBool::new(true)).is_ok());
        assert!(collect(&consumer).is_empty());
    }
}
