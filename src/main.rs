//! Buffer leak harness
//!
//! # Architecture
//! - **buffer**: Reference-counted pooled buffers and the leak ledger
//! - **transport**: HTTP client capability (reqwest) and a scripted mock
//! - **strategy**: The three ways a response can be consumed
//! - **worker**: Repeat-with-delay loops and the pool that owns them
//! - **infrastructure**: Config, logging, metrics, greeting/stats server

use buffer_leak_harness::buffer::BufferLedger;
use buffer_leak_harness::infrastructure::{
    config::Config, logging::init_logging, metrics::HarnessMetrics, serve, AppState,
};
use buffer_leak_harness::worker::LogSink;
use buffer_leak_harness::{HarnessApp, HttpTransport, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let _guards = init_logging(&config.logging)?;

    let ledger = BufferLedger::new(config.buffers.pool_capacity, config.buffers.buffer_size);
    let metrics = Arc::new(HarnessMetrics::new());

    // 1. Greeting server
    let listener = tokio::net::TcpListener::bind(config.server.socket_addr()?).await?;
    let server_stop = CancellationToken::new();
    let state = AppState {
        metrics: Arc::clone(&metrics),
        ledger: ledger.clone(),
    };
    let stopped = server_stop.clone();
    let server = tokio::spawn(serve(listener, state, async move {
        stopped.cancelled().await;
    }));

    // 2. Workers
    let client = HttpTransport::new(&config.base_url(), config.client.timeout(), ledger.clone())?;
    let mut app = HarnessApp::new(
        Arc::new(client),
        config.harness.worker_settings(),
        Arc::new(LogSink),
        Arc::clone(&metrics),
    );
    app.on_start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    app.on_stop().await;
    drop(app);
    server_stop.cancel();
    match server.await {
        Ok(Err(e)) => tracing::error!("API Server failed: {}", e),
        Err(e) => tracing::error!("API Server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    let snapshot = ledger.snapshot();
    match ledger.verify() {
        Ok(()) => tracing::info!(allocated = snapshot.allocated, "All buffers released"),
        Err(e) => tracing::warn!(
            allocated = snapshot.allocated,
            freed = snapshot.freed,
            "{}",
            e
        ),
    }

    Ok(())
}
