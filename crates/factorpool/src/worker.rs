//! Per-worker job loop.
//!
//! A worker takes one item at a time from the shared [`WorkQueue`], starts a
//! [`Runner`] for it and races the runner against a deadline:
//!
//! - until the worker has a full window of successful runs, the deadline is
//!   the configured initial deadline;
//! - afterwards it is the window average scaled by the threshold.
//!
//! A runner that loses the race is cancelled and the job resolves as
//! [`JobOutcome::TimedOut`]. The worker does not wait for a cancelled runner
//! to exit. Only successful runs feed the duration history.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::dispatch::{Job, WorkItem, WorkQueue};
use crate::history::DurationHistory;
use crate::runner::{CancellationToken, Runner};
use crate::slot::JobOutcome;

/// Deadline settings for a single worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub history_window: usize,
    pub threshold: f64,
    pub initial_deadline: Duration,
}

impl WorkerConfig {
    pub fn from_pool(config: &PoolConfig) -> Self {
        Self {
            history_window: config.history_window,
            threshold: config.threshold,
            initial_deadline: config.initial_deadline,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_pool(&PoolConfig::default())
    }
}

/// Counters reported by a worker when its queue is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStats {
    pub worker: usize,
    pub completed: usize,
    pub timed_out: usize,
    pub failed: usize,
}

impl WorkerStats {
    pub fn processed(&self) -> usize {
        self.completed + self.timed_out + self.failed
    }

    fn count(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Completed(_) => self.completed += 1,
            JobOutcome::TimedOut => self.timed_out += 1,
            JobOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Process items from `queue` until it is closed and drained.
pub async fn run_worker(
    worker: usize,
    queue: Arc<WorkQueue>,
    runner: Runner,
    config: WorkerConfig,
) -> WorkerStats {
    let mut history = DurationHistory::new(config.history_window);
    let mut stats = WorkerStats {
        worker,
        ..WorkerStats::default()
    };

    tracing::debug!(worker, "Worker ready");

    while let Some(WorkItem { job, slot }) = queue.next().await {
        let outcome = run_job(worker, job, &runner, &mut history, &config).await;
        stats.count(&outcome);
        slot.resolve(outcome);
    }

    tracing::debug!(
        worker,
        completed = stats.completed,
        timed_out = stats.timed_out,
        failed = stats.failed,
        "Worker done"
    );
    stats
}

async fn run_job(
    worker: usize,
    job: Job,
    runner: &Runner,
    history: &mut DurationHistory,
    config: &WorkerConfig,
) -> JobOutcome {
    let deadline = history.deadline(config.initial_deadline, config.threshold);
    let cancel = CancellationToken::new();
    let (tx, rx) = oneshot::channel();

    tracing::trace!(worker, job = job.index, input = job.input, ?deadline, "Processing job");

    let started = Instant::now();
    let handle = tokio::spawn(runner.clone().run(job.input, cancel.clone(), tx));

    tokio::select! {
        received = rx => match received {
            Ok(value) => {
                let elapsed = started.elapsed();
                history.record(elapsed);
                tracing::debug!(
                    worker,
                    job = job.index,
                    input = job.input,
                    ?elapsed,
                    ?deadline,
                    "Job completed"
                );
                JobOutcome::Completed(value)
            }
            Err(_) => {
                let reason = abort_reason(handle).await;
                tracing::error!(
                    worker,
                    job = job.index,
                    input = job.input,
                    %reason,
                    "Runner aborted without a result"
                );
                JobOutcome::Failed(reason)
            }
        },
        _ = tokio::time::sleep(deadline) => {
            cancel.cancel();
            tracing::warn!(
                worker,
                job = job.index,
                input = job.input,
                ?deadline,
                last_success = ?history.last(),
                "Job timed out, runner cancelled"
            );
            JobOutcome::TimedOut
        }
    }
}

/// Explain why a runner dropped its output without sending.
async fn abort_reason(handle: JoinHandle<()>) -> String {
    match handle.await {
        Err(e) if e.is_panic() => panic_message(e.into_panic()),
        Err(e) => e.to_string(),
        Ok(()) => "runner exited without a result".to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else {
        "runner panicked".to_string()
    }
}
