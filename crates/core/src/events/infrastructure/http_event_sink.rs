use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::events::domain::event_sink::EventSink;
use crate::events::domain::track_event::TrackEvent;
use crate::shared::constants::EVENT_SINK_FLUSH_TIMEOUT;

#[derive(Serialize)]
struct LogMessage<'a> {
    message: &'a str,
}

/// Posts event messages to the log service's `POST /log` endpoint.
///
/// Delivery happens on a background thread fed by a bounded channel, so
/// `emit` never waits on the network. When the backlog is full the event is
/// dropped with a warning; delivery failures are logged and swallowed.
/// `flush` delivers the backlog until its deadline, then discards what is
/// left, so it waits at most the flush timeout plus one request timeout.
pub struct HttpEventSink {
    tx: Option<Sender<String>>,
    worker: Option<JoinHandle<()>>,
    deadline: Arc<OnceLock<Instant>>,
    flush_timeout: Duration,
}

impl HttpEventSink {
    pub fn new(base_url: &str, timeout: Duration, backlog: usize) -> Result<Self, std::io::Error> {
        let endpoint = format!("{}/log", base_url.trim_end_matches('/'));
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(std::io::Error::other)?;
        let (tx, rx) = crossbeam_channel::bounded::<String>(backlog.max(1));
        let deadline = Arc::new(OnceLock::new());

        let worker_deadline = deadline.clone();
        let worker = std::thread::Builder::new()
            .name("event-sink".to_string())
            .spawn(move || deliver(&client, &endpoint, &rx, &worker_deadline))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            deadline,
            flush_timeout: EVENT_SINK_FLUSH_TIMEOUT,
        })
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }
}

fn deliver(
    client: &reqwest::blocking::Client,
    endpoint: &str,
    rx: &Receiver<String>,
    deadline: &OnceLock<Instant>,
) {
    for message in rx.iter() {
        if deadline.get().is_some_and(|d| Instant::now() >= *d) {
            let discarded = 1 + rx.try_iter().count();
            log::warn!("Event flush timed out, discarding {discarded} undelivered event(s)");
            return;
        }
        post(client, endpoint, &message);
    }
}

fn post(client: &reqwest::blocking::Client, endpoint: &str, message: &str) {
    let result = client
        .post(endpoint)
        .json(&LogMessage { message })
        .send()
        .and_then(|r| r.error_for_status());
    if let Err(e) = result {
        log::warn!("Failed to send event to {endpoint}: {e}");
    }
}

impl EventSink for HttpEventSink {
    fn emit(&mut self, event: &TrackEvent) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        match tx.try_send(event.message()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "Event backlog full, dropping {} event for track {}",
                    event.kind_str(),
                    event.track_id
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Event delivery thread is gone");
            }
        }
    }

    fn flush(&mut self) {
        let _ = self.deadline.set(Instant::now() + self.flush_timeout);
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Event delivery thread panicked");
            }
        }
    }
}

impl Drop for HttpEventSink {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::domain::track_store::TrackStore;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn event() -> TrackEvent {
        let mut store = TrackStore::new(4);
        store.upsert(5, "face", Duration::ZERO);
        TrackEvent::enter("lobby", store.get(5).unwrap())
    }

    /// Accepts `n` requests, replying 200, and forwards each body.
    fn log_service(n: usize) -> (String, mpsc::Receiver<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for _ in 0..n {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                        content_length = v.trim().parse().unwrap();
                    }
                }
                let mut body = vec![0u8; content_length];
                reader.read_exact(&mut body).unwrap();
                let _ = stream.write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 20\r\nConnection: close\r\n\r\n{\"status\":\"success\"}",
                );
                tx.send((request_line, String::from_utf8(body).unwrap())).unwrap();
            }
        });
        (format!("http://{addr}"), rx)
    }

    #[test]
    fn test_posts_message_json() {
        let (url, received) = log_service(1);
        let mut sink = HttpEventSink::new(&url, Duration::from_secs(2), 8).unwrap();

        sink.emit(&event());
        sink.flush();

        let (request_line, body) = received.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(request_line.starts_with("POST /log "));
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["message"]
            .as_str()
            .unwrap()
            .ends_with("Person 5 entered the frame"));
    }

    #[test]
    fn test_unreachable_service_is_swallowed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut sink =
            HttpEventSink::new(&format!("http://{addr}"), Duration::from_millis(200), 8).unwrap();
        sink.emit(&event());
        sink.emit(&event());
        sink.flush();
        sink.emit(&event());
    }

    #[test]
    fn test_flush_gives_up_on_silent_service() {
        // Connections are queued by the kernel but never answered.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut sink = HttpEventSink::new(&format!("http://{addr}"), Duration::from_millis(200), 64)
            .unwrap()
            .with_flush_timeout(Duration::from_millis(100));
        for _ in 0..20 {
            sink.emit(&event());
        }

        let started = Instant::now();
        sink.flush();
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        drop(listener);
    }
}
