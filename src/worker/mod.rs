//! Repeating workers
//!
//! A [`RepeatingWorker`] drives one strategy's sequence to completion,
//! forwards each payload to the sink, waits the configured delay and starts
//! a fresh sequence. It stops only when its cancellation token fires.

pub mod pool;
pub mod sink;

pub use pool::WorkerPool;
pub use sink::{LogSink, PayloadSink, RecordingSink, SinkEvent};

use crate::infrastructure::metrics::HarnessMetrics;
use crate::strategy::ConsumptionStrategy;
use crate::transport::Transport;
use futures_util::StreamExt;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default wait between iterations
pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

/// Worker identifier, unique within a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Created, not yet polled
    Idle = 0,
    /// Requesting or consuming a response
    Running = 1,
    /// Waiting out the inter-iteration delay
    Delaying = 2,
    /// Stopped; terminal
    Cancelled = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            2 => WorkerState::Delaying,
            _ => WorkerState::Cancelled,
        }
    }
}

/// Shared view of a worker's state
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Idle as u8))
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` unless already cancelled
    pub fn set(&self, next: WorkerState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != WorkerState::Cancelled as u8).then_some(next as u8)
            })
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings shared by every worker of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub strategy: ConsumptionStrategy,
    pub worker_count: usize,
    pub delay: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            strategy: ConsumptionStrategy::default(),
            worker_count: 1,
            delay: DEFAULT_DELAY,
        }
    }
}

/// Totals for one worker, returned when it stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub iterations: u64,
    pub payloads: u64,
    pub failures: u64,
}

impl WorkerReport {
    fn new(id: WorkerId) -> Self {
        Self {
            id,
            iterations: 0,
            payloads: 0,
            failures: 0,
        }
    }
}

/// One repeat-with-delay loop over a strategy
pub struct RepeatingWorker<C: Transport> {
    id: WorkerId,
    strategy: ConsumptionStrategy,
    delay: Duration,
    client: Arc<C>,
    sink: Arc<dyn PayloadSink>,
    metrics: Arc<HarnessMetrics>,
    state: Arc<StateCell>,
    cancel: CancellationToken,
}

impl<C: Transport> RepeatingWorker<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: WorkerId,
        strategy: ConsumptionStrategy,
        delay: Duration,
        client: Arc<C>,
        sink: Arc<dyn PayloadSink>,
        metrics: Arc<HarnessMetrics>,
        state: Arc<StateCell>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            strategy,
            delay,
            client,
            sink,
            metrics,
            state,
            cancel,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Run until cancelled
    ///
    /// Cancellation is checked before every request and raced against every
    /// delay. A request already in flight completes, including its buffer
    /// release, before the loop exits.
    pub async fn run(self) -> WorkerReport {
        let mut report = WorkerReport::new(self.id);
        self.metrics.worker_started();
        tracing::debug!(worker = %self.id, strategy = %self.strategy, "Worker started");

        'repeat: loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.state.set(WorkerState::Running);

            let sequence = self.strategy.get(Arc::clone(&self.client));
            tokio::pin!(sequence);

            while let Some(item) = sequence.next().await {
                report.iterations += 1;
                self.metrics.record_iteration();

                match item {
                    Ok(payload) => {
                        report.payloads += 1;
                        self.metrics.record_payload();
                        self.sink.on_payload(self.id, &payload);
                    }
                    Err(e) => {
                        report.failures += 1;
                        self.metrics.record_failure();
                        self.sink.on_failure(self.id, &e);
                        break;
                    }
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
            self.state.set(WorkerState::Delaying);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break 'repeat,
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        self.state.set(WorkerState::Cancelled);
        self.metrics.worker_stopped();
        tracing::debug!(
            worker = %self.id,
            iterations = report.iterations,
            payloads = report.payloads,
            failures = report.failures,
            "Worker stopped"
        );
        report
    }
}
