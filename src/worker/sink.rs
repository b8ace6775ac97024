//! Payload sinks
//!
//! Where a worker forwards each decoded payload or transport failure.
//! Sinks are called inline on the worker task and must not block.

use super::WorkerId;
use crate::transport::TransportError;
use parking_lot::Mutex;

/// Side-effecting consumer of worker output
pub trait PayloadSink: Send + Sync + 'static {
    fn on_payload(&self, worker: WorkerId, payload: &str);

    fn on_failure(&self, worker: WorkerId, error: &TransportError);
}

/// Default sink: debug-logs payloads, warns on failures
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PayloadSink for LogSink {
    fn on_payload(&self, worker: WorkerId, payload: &str) {
        tracing::debug!(worker = %worker, "Received {}", payload);
    }

    fn on_failure(&self, worker: WorkerId, error: &TransportError) {
        tracing::warn!(worker = %worker, error = %error, "Request failed, retrying after delay");
    }
}

/// What a [`RecordingSink`] saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Payload(WorkerId, String),
    Failure(WorkerId, TransportError),
}

impl SinkEvent {
    pub fn worker(&self) -> WorkerId {
        match self {
            SinkEvent::Payload(id, _) | SinkEvent::Failure(id, _) => *id,
        }
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn payload_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Payload(..)))
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Failure(..)))
            .count()
    }
}

impl PayloadSink for RecordingSink {
    fn on_payload(&self, worker: WorkerId, payload: &str) {
        self.events
            .lock()
            .push(SinkEvent::Payload(worker, payload.to_string()));
    }

    fn on_failure(&self, worker: WorkerId, error: &TransportError) {
        self.events
            .lock()
            .push(SinkEvent::Failure(worker, error.clone()));
    }
}
