use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::recognition::domain::recognition_dispatcher::RecognitionDispatcher;
use crate::recognition::domain::recognizer::{RecognitionRequest, RecognitionResult, Recognizer};

/// Runs recognition on a fixed pool of named worker threads.
///
/// Requests travel over a bounded channel shared by all workers; when it is
/// full, `submit` hands the request back instead of blocking the frame path.
/// Results come back over a second channel and are drained by `poll`.
pub struct WorkerPoolDispatcher {
    request_tx: Option<Sender<RecognitionRequest>>,
    result_rx: Receiver<RecognitionResult>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPoolDispatcher {
    pub fn new(
        recognizer: Recognizer,
        workers: usize,
        queue_capacity: usize,
        name_prefix: &str,
    ) -> Result<Self, std::io::Error> {
        let (request_tx, request_rx) =
            crossbeam_channel::bounded::<RecognitionRequest>(queue_capacity.max(1));
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<RecognitionResult>();

        let mut handles = Vec::with_capacity(workers.max(1));
        for i in 0..workers.max(1) {
            let rx = request_rx.clone();
            let tx = result_tx.clone();
            let recognizer = recognizer.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{name_prefix}-recognize-{i}"))
                .spawn(move || {
                    for request in rx {
                        if tx.send(recognizer.recognize(&request)).is_err() {
                            break;
                        }
                    }
                })?;
            handles.push(handle);
        }

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            workers: handles,
        })
    }

    pub fn pending(&self) -> usize {
        self.request_tx.as_ref().map_or(0, |tx| tx.len())
    }
}

impl RecognitionDispatcher for WorkerPoolDispatcher {
    fn submit(&mut self, request: RecognitionRequest) -> Result<(), RecognitionRequest> {
        let Some(tx) = self.request_tx.as_ref() else {
            return Err(request);
        };
        tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(r) | TrySendError::Disconnected(r) => r,
        })
    }

    fn poll(&mut self) -> Vec<RecognitionResult> {
        self.result_rx.try_iter().collect()
    }

    fn shutdown(&mut self) {
        // Closing the request channel lets workers finish what is queued and exit.
        self.request_tx = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Recognition worker panicked");
            }
        }
    }
}

impl Drop for WorkerPoolDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
