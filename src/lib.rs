//! Buffer leak harness
//!
//! Drives a configurable number of workers that repeatedly fetch a
//! greeting over HTTP and consume each response with one of three
//! strategies. Two of them are correct; `exchange` holds on to the
//! reference-counted buffer behind every response and never gives it back,
//! which the buffer ledger reports as outstanding and, eventually, leaked.

pub mod app;
pub mod buffer;
pub mod infrastructure;
pub mod strategy;
pub mod transport;
pub mod worker;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use app::HarnessApp;
pub use buffer::{BufferError, BufferLedger, RefCountedBuffer};
pub use infrastructure::config::{Config, ConfigError};
pub use strategy::ConsumptionStrategy;
pub use transport::{HttpTransport, Transport, TransportError};
pub use worker::{WorkerPool, WorkerSettings};

use thiserror::Error;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Buffers not released: {outstanding} outstanding, {leaked} leaked")]
    LeakViolation { outstanding: u64, leaked: u64 },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, HarnessError>;
