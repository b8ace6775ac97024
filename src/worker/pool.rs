//! Worker pool lifecycle
//!
//! Owns the cancellation token and task of every worker it started.
//! `shutdown` signals all of them, then waits for each task to finish, so
//! once it returns no worker can issue another request.

use super::{
    PayloadSink, RepeatingWorker, StateCell, WorkerId, WorkerReport, WorkerSettings, WorkerState,
};
use crate::infrastructure::metrics::HarnessMetrics;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Pool-side record of one worker
struct WorkerHandle {
    id: WorkerId,
    cancel: CancellationToken,
    state: Arc<StateCell>,
    task: JoinHandle<WorkerReport>,
}

/// Set of repeating workers managed as one unit
pub struct WorkerPool {
    settings: WorkerSettings,
    workers: Vec<WorkerHandle>,
    shut_down: bool,
}

impl WorkerPool {
    /// Spawn `settings.worker_count` workers on the current tokio runtime
    ///
    /// Each worker's cancellation token exists before its task is spawned,
    /// so there is no moment where a worker runs but can't be reached by
    /// [`shutdown`](Self::shutdown).
    pub fn start<C: Transport>(
        client: Arc<C>,
        settings: WorkerSettings,
        sink: Arc<dyn PayloadSink>,
        metrics: Arc<HarnessMetrics>,
    ) -> Self {
        let mut workers = Vec::with_capacity(settings.worker_count);

        for index in 0..settings.worker_count {
            let id = WorkerId(index);
            let cancel = CancellationToken::new();
            let state = Arc::new(StateCell::new());

            let worker = RepeatingWorker::new(
                id,
                settings.strategy,
                settings.delay,
                Arc::clone(&client),
                Arc::clone(&sink),
                Arc::clone(&metrics),
                Arc::clone(&state),
                cancel.clone(),
            );
            let task = tokio::spawn(worker.run());

            workers.push(WorkerHandle {
                id,
                cancel,
                state,
                task,
            });
        }

        tracing::info!(
            workers = workers.len(),
            strategy = %settings.strategy,
            delay_ms = settings.delay.as_millis() as u64,
            "Worker pool started"
        );

        Self {
            settings,
            workers,
            shut_down: false,
        }
    }

    pub fn settings(&self) -> WorkerSettings {
        self.settings
    }

    /// Number of workers still registered
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Current state of every registered worker
    pub fn states(&self) -> Vec<(WorkerId, WorkerState)> {
        self.workers.iter().map(|w| (w.id, w.state.get())).collect()
    }

    /// Cancel every worker and wait for all of them to stop
    ///
    /// Returns the per-worker reports. Calling it again returns an empty
    /// list and does nothing else.
    pub async fn shutdown(&mut self) -> Vec<WorkerReport> {
        if self.shut_down {
            return Vec::new();
        }
        self.shut_down = true;

        for worker in &self.workers {
            worker.cancel.cancel();
        }

        let workers = std::mem::take(&mut self.workers);
        let mut reports = Vec::with_capacity(workers.len());

        for worker in workers {
            match worker.task.await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(worker = %worker.id, error = %e, "Worker task failed"),
            }
        }

        tracing::info!(workers = reports.len(), "Worker pool shut down");
        reports
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Without an awaited shutdown, at least stop further iterations
        for worker in &self.workers {
            worker.cancel.cancel();
        }
    }
}
