//! In-memory transport with scripted responses
//!
//! Records every request with its start and completion time and keeps a
//! observer on every buffer it hands out, so callers can inspect counts after
//! the strategies are done with them.

use super::{Response, Transport, TransportError};
use crate::buffer::{BufferLedger, BufferObserver};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One request seen by the mock
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub path: String,
    pub started_at: Instant,
    pub completed_at: Option<Instant>,
}

/// Scripted transport for tests and dry runs
pub struct MockTransport {
    ledger: BufferLedger,
    body: Option<String>,
    initial_ref_count: usize,
    latency: Duration,
    response_limit: Option<usize>,
    requests: Mutex<Vec<RequestRecord>>,
    buffers: Mutex<Vec<BufferObserver>>,
    scripted_failures: Mutex<VecDeque<TransportError>>,
    responses: Mutex<usize>,
}

impl MockTransport {
    /// Mock answering every path with a greeting, buffers starting at count 1
    pub fn new(ledger: BufferLedger) -> Self {
        Self {
            ledger,
            body: Some("Hello mock; ".repeat(20)),
            initial_ref_count: 1,
            latency: Duration::ZERO,
            response_limit: None,
            requests: Mutex::new(Vec::new()),
            buffers: Mutex::new(Vec::new()),
            scripted_failures: Mutex::new(VecDeque::new()),
            responses: Mutex::new(0),
        }
    }

    /// Answer with `body`, or with no body at all for `None`
    pub fn with_body(mut self, body: Option<&str>) -> Self {
        self.body = body.map(str::to_string);
        self
    }

    /// Starting count of every buffer handed out by `exchange`
    pub fn with_initial_ref_count(mut self, ref_count: usize) -> Self {
        self.initial_ref_count = ref_count;
        self
    }

    /// Simulated network time per request
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Succeed at most `limit` times; every later request fails
    pub fn with_response_limit(mut self, limit: usize) -> Self {
        self.response_limit = Some(limit);
        self
    }

    /// Make the next request fail with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.scripted_failures.lock().push_back(error);
    }

    pub fn ledger(&self) -> &BufferLedger {
        &self.ledger
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of successful responses produced so far
    pub fn response_count(&self) -> usize {
        *self.responses.lock()
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.requests.lock().clone()
    }

    /// Observers on every buffer handed out, in order
    pub fn buffers(&self) -> Vec<BufferObserver> {
        self.buffers.lock().clone()
    }

    async fn begin(&self, path: &str) -> Result<(), TransportError> {
        let index = {
            let mut requests = self.requests.lock();
            requests.push(RequestRecord {
                path: path.to_string(),
                started_at: Instant::now(),
                completed_at: None,
            });
            requests.len() - 1
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = if let Some(error) = self.scripted_failures.lock().pop_front() {
            Err(error)
        } else {
            let mut responses = self.responses.lock();
            match self.response_limit {
                Some(limit) if *responses >= limit => {
                    Err(TransportError::Request("mock response limit reached".to_string()))
                }
                _ => {
                    *responses += 1;
                    Ok(())
                }
            }
        };

        if let Some(record) = self.requests.lock().get_mut(index) {
            record.completed_at = Some(Instant::now());
        }
        outcome
    }
}

impl Transport for MockTransport {
    async fn retrieve(&self, path: &str) -> Result<String, TransportError> {
        self.begin(path).await?;
        self.body.clone().ok_or(TransportError::MissingBody)
    }

    async fn exchange(&self, path: &str) -> Result<Response, TransportError> {
        self.begin(path).await?;

        let Some(body) = self.body.clone() else {
            return Ok(Response::new(200, None));
        };

        let buffer = self
            .ledger
            .allocate_with_count(body.as_bytes(), self.initial_ref_count);
        self.buffers.lock().push(buffer.observer());

        Ok(Response::new(200, Some(body)).with_raw_buffer(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exchange_hands_out_tracked_buffer() {
        let mock = MockTransport::new(BufferLedger::new(2, 64));

        let response = mock.exchange("/hello/exchange").await.unwrap();
        assert_eq!(response.raw_buffer().map(|b| b.ref_count()), Some(1));

        let observers = mock.buffers();
        assert_eq!(observers.len(), 1);
        assert_eq!(mock.requests()[0].path, "/hello/exchange");
        assert!(mock.requests()[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_retrieve_has_no_buffer() {
        let mock = MockTransport::new(BufferLedger::new(2, 64)).with_body(Some("plain"));

        assert_eq!(mock.retrieve("/hello/retrieve").await.unwrap(), "plain");
        assert!(mock.buffers().is_empty());
        assert_eq!(mock.ledger().snapshot().allocated, 0);
    }

    #[tokio::test]
    async fn test_scripted_failure_then_recovery() {
        let mock = MockTransport::new(BufferLedger::new(2, 64));
        mock.fail_next(TransportError::Status(500));

        assert_eq!(mock.retrieve("/a").await, Err(TransportError::Status(500)));
        assert!(mock.retrieve("/a").await.is_ok());
        assert_eq!(mock.request_count(), 2);
        assert_eq!(mock.response_count(), 1);
    }

    #[tokio::test]
    async fn test_response_limit() {
        let mock = MockTransport::new(BufferLedger::new(2, 64)).with_response_limit(1);

        assert!(mock.retrieve("/a").await.is_ok());
        assert!(matches!(mock.retrieve("/a").await, Err(TransportError::Request(_))));
    }
}
