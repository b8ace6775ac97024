//! API Server
//!
//! Serves the greeting endpoint the workers hit and a JSON stats view of
//! the worker metrics and buffer ledger.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::buffer::{BufferLedger, LedgerSnapshot};
use crate::infrastructure::metrics::{HarnessMetrics, MetricsSnapshot};
use crate::HarnessError;

/// Times the greeting is repeated in one response body
const GREETING_REPEAT: usize = 20;

/// Stats response DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDto {
    pub metrics: MetricsSnapshot,
    pub buffers: LedgerSnapshot,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<HarnessMetrics>,
    pub ledger: BufferLedger,
}

/// Greeting body for `username`
pub fn greeting(username: &str) -> String {
    format!("Hello {}; ", username).repeat(GREETING_REPEAT)
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hello/:username", get(get_greeting))
        .route("/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), HarnessError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!("API Server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(HarnessError::Io)?;

    tracing::info!("API Server stopped");
    Ok(())
}

/// Handler for /hello/:username
async fn get_greeting(Path(username): Path<String>) -> String {
    greeting(&username)
}

/// Handler for /stats
async fn get_stats(State(state): State<AppState>) -> Json<StatsDto> {
    Json(StatsDto {
        metrics: state.metrics.snapshot(),
        buffers: state.ledger.snapshot(),
    })
}
