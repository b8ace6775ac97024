//! Client capability consumed by the strategies
//!
//! The transport is a black box: it can fetch a path either as already
//! decoded text (`retrieve`) or as a full [`Response`] that may carry the
//! raw reference-counted buffer the body was decoded from (`exchange`).
//! Implementations must be safe to call concurrently from every worker.

pub mod http;
pub mod mock;

pub use http::HttpTransport;
pub use mock::{MockTransport, RequestRecord};

use crate::buffer::RefCountedBuffer;
use std::future::Future;

/// Failure of a single request/response exchange
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Unexpected status: {0}")]
    Status(u16),
    #[error("Response has no body")]
    MissingBody,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// A received message
///
/// The body is decoded eagerly. When the transport decoded it through a
/// pooled buffer, the buffer travels along with one claim still held.
#[derive(Debug)]
pub struct Response {
    status: u16,
    body: Option<String>,
    raw_buffer: Option<RefCountedBuffer>,
}

impl Response {
    pub fn new(status: u16, body: Option<String>) -> Self {
        Self {
            status,
            body,
            raw_buffer: None,
        }
    }

    /// Attach the buffer the body was decoded from
    pub fn with_raw_buffer(mut self, buffer: RefCountedBuffer) -> Self {
        self.raw_buffer = Some(buffer);
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn raw_buffer(&self) -> Option<&RefCountedBuffer> {
        self.raw_buffer.as_ref()
    }

    /// Move the raw buffer's claim out of the response
    pub fn take_raw_buffer(&mut self) -> Option<RefCountedBuffer> {
        self.raw_buffer.take()
    }

    /// Consume the response, keeping only the decoded body
    ///
    /// A raw buffer still attached is dropped without being released.
    pub fn into_body(self) -> Option<String> {
        self.body
    }
}

/// HTTP client capability shared read-only by all workers
///
/// # Design Notes
/// - Generic, not object-safe: workers are monomorphized over the transport
/// - Returned futures are `Send` so each worker can run on its own task
pub trait Transport: Send + Sync + 'static {
    /// Fetch `path` with the body fully decoded; no buffer is exposed
    fn retrieve(&self, path: &str) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Fetch `path` as a full response
    fn exchange(&self, path: &str) -> impl Future<Output = Result<Response, TransportError>> + Send;
}
