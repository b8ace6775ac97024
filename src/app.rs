//! Harness Application
//!
//! Owns the worker pool lifecycle for the host process: `on_start` builds
//! and launches the pool, `on_stop` shuts it down. The pool is created here
//! and nowhere else; there is no global registry.

use crate::infrastructure::metrics::HarnessMetrics;
use crate::transport::Transport;
use crate::worker::{PayloadSink, WorkerPool, WorkerReport, WorkerSettings};
use std::sync::Arc;

/// Lifecycle phase of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Started,
    Stopped,
}

/// Harness lifecycle owner
pub struct HarnessApp<C: Transport> {
    client: Arc<C>,
    settings: WorkerSettings,
    sink: Arc<dyn PayloadSink>,
    metrics: Arc<HarnessMetrics>,
    pool: Option<WorkerPool>,
    phase: Phase,
}

impl<C: Transport> HarnessApp<C> {
    pub fn new(
        client: Arc<C>,
        settings: WorkerSettings,
        sink: Arc<dyn PayloadSink>,
        metrics: Arc<HarnessMetrics>,
    ) -> Self {
        Self {
            client,
            settings,
            sink,
            metrics,
            pool: None,
            phase: Phase::Created,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn metrics(&self) -> Arc<HarnessMetrics> {
        self.metrics.clone()
    }

    /// Number of running workers
    pub fn worker_count(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::len)
    }

    /// Build and launch the worker pool
    ///
    /// Returns `false` without doing anything if the app was already started
    /// or has been stopped.
    pub fn on_start(&mut self) -> bool {
        if self.phase != Phase::Created {
            tracing::warn!(phase = ?self.phase, "on_start ignored");
            return false;
        }

        tracing::info!(
            "Starting test of {} with {} worker(s) and delay {:?}",
            self.settings.strategy,
            self.settings.worker_count,
            self.settings.delay
        );

        self.pool = Some(WorkerPool::start(
            Arc::clone(&self.client),
            self.settings,
            Arc::clone(&self.sink),
            Arc::clone(&self.metrics),
        ));
        self.phase = Phase::Started;
        true
    }

    /// Shut the pool down and wait for every worker to stop
    ///
    /// Safe to call more than once, and before `on_start`; only the first
    /// call after a start does any work.
    pub async fn on_stop(&mut self) -> Vec<WorkerReport> {
        let reports = match self.pool.take() {
            Some(mut pool) => pool.shutdown().await,
            None => Vec::new(),
        };
        self.phase = Phase::Stopped;

        if !reports.is_empty() {
            let snapshot = self.metrics.snapshot();
            tracing::info!(
                iterations = snapshot.iterations,
                payloads = snapshot.payloads,
                failures = snapshot.failures,
                "Harness stopped"
            );
        }
        reports
    }
}
