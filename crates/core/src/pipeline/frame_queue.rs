use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};

use crate::shared::frame::Frame;

const BLOCK_SLICE: Duration = Duration::from_millis(50);

/// What travels from the ingestor to the processing stage.
#[derive(Debug)]
pub enum QueueItem {
    Frame(Frame),
    /// The connection that produced `epoch` ended; tracked state must be
    /// flushed before any later frame is processed.
    EndOfStream { epoch: u64 },
}

/// Producer behaviour when the queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Wait for room. Lossless; capture stalls while processing lags.
    #[default]
    Block,
    /// Discard the oldest queued item to make room.
    DropOldest,
    /// Discard the incoming frame.
    DropNewest,
}

impl BackpressurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            BackpressurePolicy::Block => "block",
            BackpressurePolicy::DropOldest => "drop-oldest",
            BackpressurePolicy::DropNewest => "drop-newest",
        }
    }
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(BackpressurePolicy::Block),
            "drop-oldest" | "drop_oldest" => Ok(BackpressurePolicy::DropOldest),
            "drop-newest" | "drop_newest" => Ok(BackpressurePolicy::DropNewest),
            other => Err(format!(
                "unknown backpressure policy '{other}' (expected block, drop-oldest or drop-newest)"
            )),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PushError {
    /// The consumer is gone.
    Closed,
    /// `stop` was raised while waiting for room.
    Stopped,
}

/// Creates a bounded frame queue. Capacity is at least one.
pub fn frame_queue(capacity: usize, policy: BackpressurePolicy) -> (FrameProducer, FrameConsumer) {
    let capacity = capacity.max(1);
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let evict = match policy {
        BackpressurePolicy::DropOldest => Some(rx.clone()),
        _ => None,
    };
    (
        FrameProducer {
            tx,
            evict,
            policy,
            dropped: dropped.clone(),
        },
        FrameConsumer {
            rx,
            capacity,
            dropped,
        },
    )
}

pub struct FrameProducer {
    tx: Sender<QueueItem>,
    evict: Option<Receiver<QueueItem>>,
    policy: BackpressurePolicy,
    dropped: Arc<AtomicU64>,
}

impl FrameProducer {
    /// Queues a frame according to the backpressure policy. Dropped frames
    /// are counted, not reported as errors.
    pub fn push_frame(&self, frame: Frame, stop: &AtomicBool) -> Result<(), PushError> {
        let item = QueueItem::Frame(frame);
        match self.policy {
            BackpressurePolicy::Block => self.push_blocking(item, stop),
            BackpressurePolicy::DropNewest => match self.tx.try_send(item) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(TrySendError::Disconnected(_)) => Err(PushError::Closed),
            },
            BackpressurePolicy::DropOldest => self.push_evicting(item),
        }
    }

    /// Queues an end-of-stream marker. Markers always wait for room.
    pub fn push_end_of_stream(&self, epoch: u64, stop: &AtomicBool) -> Result<(), PushError> {
        self.push_blocking(QueueItem::EndOfStream { epoch }, stop)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn push_blocking(&self, mut item: QueueItem, stop: &AtomicBool) -> Result<(), PushError> {
        loop {
            if stop.load(Ordering::Relaxed) {
                return Err(PushError::Stopped);
            }
            match self.tx.send_timeout(item, BLOCK_SLICE) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(_)) => return Err(PushError::Closed),
            }
        }
    }

    fn push_evicting(&self, mut item: QueueItem) -> Result<(), PushError> {
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Disconnected(_)) => return Err(PushError::Closed),
                Err(TrySendError::Full(back)) => {
                    item = back;
                    if let Some(evict) = &self.evict {
                        if evict.try_recv().is_ok() {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }
    }
}

pub struct FrameConsumer {
    rx: Receiver<QueueItem>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl FrameConsumer {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<QueueItem, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Instant;

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0u8; 12], 2, 2, 3, index)
    }

    fn drain_indices(consumer: &FrameConsumer) -> Vec<usize> {
        let mut out = Vec::new();
        while let Ok(item) = consumer.recv_timeout(Duration::from_millis(5)) {
            if let QueueItem::Frame(f) = item {
                out.push(f.index());
            }
        }
        out
    }

    #[rstest]
    #[case("block", BackpressurePolicy::Block)]
    #[case("drop-oldest", BackpressurePolicy::DropOldest)]
    #[case("DROP_NEWEST", BackpressurePolicy::DropNewest)]
    fn test_parse_policy(#[case] text: &str, #[case] expected: BackpressurePolicy) {
        assert_eq!(text.parse::<BackpressurePolicy>().unwrap(), expected);
        assert_eq!(expected.as_str().parse::<BackpressurePolicy>().unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_unknown_policy() {
        assert!("sometimes".parse::<BackpressurePolicy>().is_err());
    }

    #[test]
    fn test_block_is_default() {
        assert_eq!(BackpressurePolicy::default(), BackpressurePolicy::Block);
    }

    #[test]
    fn test_fifo_order() {
        let (producer, consumer) = frame_queue(8, BackpressurePolicy::Block);
        let stop = AtomicBool::new(false);
        for i in 0..5 {
            producer.push_frame(frame(i), &stop).unwrap();
        }
        assert_eq!(drain_indices(&consumer), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_drop_newest_keeps_queue_bounded() {
        let (producer, consumer) = frame_queue(3, BackpressurePolicy::DropNewest);
        let stop = AtomicBool::new(false);
        for i in 0..10 {
            producer.push_frame(frame(i), &stop).unwrap();
            assert!(consumer.len() <= 3);
        }
        assert_eq!(consumer.dropped(), 7);
        assert_eq!(drain_indices(&consumer), vec![0, 1, 2]);
    }

    #[test]
    fn test_drop_oldest_keeps_latest_frames() {
        let (producer, consumer) = frame_queue(3, BackpressurePolicy::DropOldest);
        let stop = AtomicBool::new(false);
        for i in 0..10 {
            producer.push_frame(frame(i), &stop).unwrap();
            assert!(consumer.len() <= 3);
        }
        assert_eq!(producer.dropped(), 7);
        assert_eq!(drain_indices(&consumer), vec![7, 8, 9]);
    }

    #[test]
    fn test_block_waits_until_stopped() {
        let (producer, consumer) = frame_queue(1, BackpressurePolicy::Block);
        let stop = Arc::new(AtomicBool::new(false));
        producer.push_frame(frame(0), &stop).unwrap();

        let flag = stop.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            flag.store(true, Ordering::Relaxed);
        });
        let started = Instant::now();
        assert_eq!(producer.push_frame(frame(1), &stop), Err(PushError::Stopped));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(consumer.len(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn test_block_resumes_when_consumer_catches_up() {
        let (producer, consumer) = frame_queue(1, BackpressurePolicy::Block);
        let stop = AtomicBool::new(false);
        producer.push_frame(frame(0), &stop).unwrap();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let mut seen = Vec::new();
            while let Ok(QueueItem::Frame(f)) = consumer.recv_timeout(Duration::from_secs(2)) {
                seen.push(f.index());
            }
            seen
        });
        producer.push_frame(frame(1), &stop).unwrap();
        drop(producer);
        assert_eq!(handle.join().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_push_after_consumer_dropped_is_closed() {
        let (producer, consumer) = frame_queue(2, BackpressurePolicy::Block);
        drop(consumer);
        let stop = AtomicBool::new(false);
        assert_eq!(producer.push_frame(frame(0), &stop), Err(PushError::Closed));
    }

    #[test]
    fn test_end_of_stream_marker_is_delivered_in_order() {
        let (producer, consumer) = frame_queue(4, BackpressurePolicy::DropNewest);
        let stop = AtomicBool::new(false);
        producer.push_frame(frame(0), &stop).unwrap();
        producer.push_end_of_stream(3, &stop).unwrap();

        assert!(matches!(
            consumer.recv_timeout(Duration::from_millis(5)),
            Ok(QueueItem::Frame(_))
        ));
        assert!(matches!(
            consumer.recv_timeout(Duration::from_millis(5)),
            Ok(QueueItem::EndOfStream { epoch: 3 })
        ));
    }
}
