//! Single-use result slots.
//!
//! A slot is split into a writer half ([`ResultSlot`]) that travels with the
//! job to a worker, and a reader half ([`PendingResult`]) that is handed back
//! to the submitter in submission order. Resolving consumes the writer, so a
//! slot can be written at most once; waiting consumes the reader.

use num_bigint::BigUint;
use tokio::sync::oneshot;

use crate::error::PoolError;

/// How a job was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The runner finished within its deadline.
    Completed(BigUint),
    /// The deadline expired first; the runner was cancelled.
    TimedOut,
    /// The runner aborted without producing a value.
    Failed(String),
}

impl JobOutcome {
    /// The value reported to consumers: the result, or the sentinel `0`
    /// for timed out and failed jobs.
    pub fn value(&self) -> BigUint {
        match self {
            JobOutcome::Completed(value) => value.clone(),
            JobOutcome::TimedOut | JobOutcome::Failed(_) => BigUint::from(0u32),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, JobOutcome::TimedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed(_) => "completed",
            JobOutcome::TimedOut => "timed_out",
            JobOutcome::Failed(_) => "failed",
        }
    }
}

/// Create a connected writer/reader pair for the job at `index`.
pub fn result_slot(index: usize, input: i64) -> (ResultSlot, PendingResult) {
    let (tx, rx) = oneshot::channel();
    (
        ResultSlot {
            index,
            tx: Some(tx),
        },
        PendingResult { index, input, rx },
    )
}

/// Writer half of a result slot.
#[derive(Debug)]
pub struct ResultSlot {
    index: usize,
    tx: Option<oneshot::Sender<JobOutcome>>,
}

impl ResultSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Hand the outcome to the reader. Never blocks.
    ///
    /// Returns `false` if the reader was already dropped.
    pub fn resolve(mut self, outcome: JobOutcome) -> bool {
        let Some(tx) = self.tx.take() else {
            return false;
        };
        match tx.send(outcome) {
            Ok(()) => true,
            Err(_) => {
                tracing::trace!(job = self.index, "Result reader gone, outcome discarded");
                false
            }
        }
    }
}

impl Drop for ResultSlot {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::error!(job = self.index, "Result slot dropped without being resolved");
        }
    }
}

/// Reader half of a result slot, carrying the job's submission index and input.
#[derive(Debug)]
pub struct PendingResult {
    index: usize,
    input: i64,
    rx: oneshot::Receiver<JobOutcome>,
}

impl PendingResult {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn input(&self) -> i64 {
        self.input
    }

    /// Wait for the worker to resolve the slot.
    pub async fn wait(self) -> Result<JobOutcome, PoolError> {
        let index = self.index;
        self.rx.await.map_err(|_| PoolError::SlotDropped { index })
    }
}
