//! Infrastructure
//!
//! Everything around the worker loop:
//! - Configuration management
//! - Logging and metrics
//! - The greeting/stats API server

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;

pub use api::{router, serve, AppState};
pub use config::{Config, ConfigError};
pub use metrics::HarnessMetrics;
