//! Fan-out of job inputs onto the shared work queue.
//!
//! Every input gets a result slot. The reader half goes onto the ordered
//! pending-results channel first, then the job and writer half go onto the
//! work queue, so pending results come back in submission order no matter
//! which worker finishes first.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::slot::{PendingResult, ResultSlot, result_slot};

/// One unit of work: the input and its zero-based submission index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub index: usize,
    pub input: i64,
}

/// A job bound to the slot its outcome must be written to.
#[derive(Debug)]
pub struct WorkItem {
    pub job: Job,
    pub slot: ResultSlot,
}

/// Work queue shared by all workers of a pool.
///
/// The first worker to take the lock receives the next item.
pub struct WorkQueue {
    rx: Mutex<mpsc::Receiver<WorkItem>>,
}

impl WorkQueue {
    /// Create a bounded queue and its sending side.
    pub fn bounded(capacity: usize) -> (mpsc::Sender<WorkItem>, Arc<Self>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Arc::new(Self { rx: Mutex::new(rx) }))
    }

    /// Next item, or `None` once every sender is gone and the queue is drained.
    pub async fn next(&self) -> Option<WorkItem> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

/// Turn `inputs` into work items until the input channel closes.
///
/// Returns the number of jobs dispatched.
pub async fn dispatch(
    mut inputs: mpsc::Receiver<i64>,
    pending_tx: mpsc::Sender<PendingResult>,
    work_tx: mpsc::Sender<WorkItem>,
) -> usize {
    let mut index = 0;

    while let Some(input) = inputs.recv().await {
        let (slot, pending) = result_slot(index, input);

        if pending_tx.send(pending).await.is_err() {
            tracing::warn!(job = index, "Result collector gone, stopping dispatch");
            break;
        }

        let job = Job { index, input };
        if work_tx.send(WorkItem { job, slot }).await.is_err() {
            tracing::error!(job = index, "Work queue closed, stopping dispatch");
            break;
        }

        tracing::trace!(job = index, input, "Job dispatched");
        index += 1;
    }

    tracing::debug!(dispatched = index, "Dispatch finished");
    index
}
