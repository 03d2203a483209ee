//! Pool supervisor.
//!
//! [`WorkerPool`] owns a validated [`PoolConfig`] and wires one run:
//!
//! ```text
//! inputs ──► dispatch ──► work queue ──► N workers
//!               │                           │
//!               └──► pending results ◄──────┘ (per-job slots)
//!                          │
//!                          ▼
//!                  collector ──► ResultSink
//! ```
//!
//! The collector awaits pending results in submission order, so reports
//! reach the sink ordered even though workers finish out of order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::dispatch::{WorkQueue, dispatch};
use crate::error::{ConfigError, PoolError};
use crate::report::{JobReport, ResultSink};
use crate::runner::{Runner, Workload};
use crate::slot::PendingResult;
use crate::worker::{WorkerConfig, WorkerStats, run_worker};

/// Aggregate counters for one finished run.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub worker_count: usize,
    pub completed: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub workers: Vec<WorkerStats>,
}

impl RunSummary {
    fn from_workers(run_id: Uuid, workers: Vec<WorkerStats>, elapsed: Duration) -> Self {
        let mut summary = Self {
            run_id,
            worker_count: workers.len(),
            completed: 0,
            timed_out: 0,
            failed: 0,
            elapsed,
            workers: Vec::new(),
        };
        for stats in &workers {
            summary.completed += stats.completed;
            summary.timed_out += stats.timed_out;
            summary.failed += stats.failed;
        }
        summary.workers = workers;
        summary
    }

    pub fn processed(&self) -> usize {
        self.completed + self.timed_out + self.failed
    }
}

/// Running pool started by [`WorkerPool::start`].
pub struct PoolHandle {
    pending: mpsc::Receiver<PendingResult>,
    dispatcher: JoinHandle<usize>,
    workers: Vec<JoinHandle<WorkerStats>>,
}

impl PoolHandle {
    /// Next pending result in submission order.
    ///
    /// Returns `None` once the input channel is closed and every job has
    /// been handed out.
    pub async fn next_result(&mut self) -> Option<PendingResult> {
        self.pending.recv().await
    }

    /// Stop collecting and wait for dispatch and every worker to exit.
    ///
    /// Pending results not yet taken are discarded. Dispatch only exits once
    /// its input channel is closed or it fails to hand out a result, so the
    /// input sender must be dropped first.
    pub async fn join(self) -> Result<Vec<WorkerStats>, PoolError> {
        let Self {
            pending,
            dispatcher,
            workers,
        } = self;
        drop(pending);

        let dispatched = dispatcher.await?;
        let mut stats = Vec::with_capacity(workers.len());
        for handle in workers {
            stats.push(handle.await?);
        }
        tracing::debug!(dispatched, workers = stats.len(), "Pool joined");
        Ok(stats)
    }
}

/// Fixed-size pool of adaptive-deadline workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    config: PoolConfig,
    runner: Runner,
}

impl WorkerPool {
    /// Validate `config` and build a factorial pool from it.
    pub fn new(config: PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let runner = Runner::from_config(&config);
        Ok(Self { config, runner })
    }

    pub fn with_runner(mut self, runner: Runner) -> Self {
        self.runner = runner;
        self
    }

    /// Swap the workload, keeping delay and skip settings.
    pub fn with_workload(mut self, workload: Arc<dyn Workload>) -> Self {
        self.runner = self.runner.with_workload(workload);
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.config.worker_count()
    }

    /// Spawn the workers and dispatch, fed from `inputs`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, inputs: mpsc::Receiver<i64>) -> PoolHandle {
        let worker_count = self.worker_count();
        let (work_tx, queue) = WorkQueue::bounded(worker_count);
        let (pending_tx, pending) = mpsc::channel(worker_count);
        let worker_config = WorkerConfig::from_pool(&self.config);

        let workers = (0..worker_count)
            .map(|worker| {
                let job_loop = run_worker(
                    worker,
                    Arc::clone(&queue),
                    self.runner.clone(),
                    worker_config.clone(),
                );
                tokio::spawn(job_loop.in_current_span())
            })
            .collect();
        let dispatcher = tokio::spawn(dispatch(inputs, pending_tx, work_tx).in_current_span());

        tracing::debug!(workers = worker_count, "Pool started");

        PoolHandle {
            pending,
            dispatcher,
            workers,
        }
    }

    /// Run every input through the pool and hand the reports to `sink` in
    /// submission order.
    pub async fn run<I, S>(&self, inputs: I, sink: &mut S) -> Result<RunSummary, PoolError>
    where
        I: IntoIterator<Item = i64>,
        I::IntoIter: Send + 'static,
        S: ResultSink + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        self.run_inner(run_id, inputs.into_iter(), sink)
            .instrument(span)
            .await
    }

    async fn run_inner<It, S>(
        &self,
        run_id: Uuid,
        inputs: It,
        sink: &mut S,
    ) -> Result<RunSummary, PoolError>
    where
        It: Iterator<Item = i64> + Send + 'static,
        S: ResultSink + ?Sized,
    {
        let started = Instant::now();
        let worker_count = self.worker_count();
        tracing::info!(
            workers = worker_count,
            history_window = self.config.history_window,
            threshold = self.config.threshold,
            "Starting run"
        );

        let (input_tx, input_rx) = mpsc::channel(worker_count);
        let feeder = tokio::spawn(
            async move {
                let mut sent = 0usize;
                for input in inputs {
                    if input_tx.send(input).await.is_err() {
                        tracing::warn!(sent, "Dispatch gone, stopping input feed");
                        break;
                    }
                    sent += 1;
                }
                sent
            }
            .in_current_span(),
        );

        let mut handle = self.start(input_rx);
        let mut received = 0usize;
        while let Some(pending) = handle.next_result().await {
            let index = pending.index();
            let input = pending.input();
            let outcome = pending.wait().await?;
            sink.consume(JobReport::new(index, input, outcome))?;
            received += 1;
        }
        sink.finish()?;

        let expected = feeder.await?;
        let workers = handle.join().await?;
        if received < expected {
            return Err(PoolError::ResultsExhausted { received, expected });
        }

        let summary = RunSummary::from_workers(run_id, workers, started.elapsed());
        tracing::info!(
            jobs = received,
            completed = summary.completed,
            timed_out = summary.timed_out,
            failed = summary.failed,
            elapsed = ?summary.elapsed,
            "Run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;

    use super::*;
    use crate::input::RandomInputs;
    use crate::runner::{ArtificialDelay, CancellationToken};
    use crate::slot::JobOutcome;

    fn pool(config: PoolConfig) -> WorkerPool {
        WorkerPool::new(config).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn results_come_back_in_submission_order() {
        let config = PoolConfig::default()
            .with_worker_count(8)
            .with_max_delay(Duration::from_millis(20))
            .with_skip_compute(true);
        let inputs: Vec<i64> = (0..50).rev().collect();

        let mut reports: Vec<JobReport> = Vec::new();
        let summary = pool(config).run(inputs.clone(), &mut reports).await.unwrap();

        assert_eq!(reports.len(), 50);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.index, i);
            assert_eq!(report.input, inputs[i]);
            assert_eq!(report.value(), BigUint::from(inputs[i] as u64));
        }
        assert_eq!(summary.completed, 50);
        assert_eq!(summary.worker_count, 8);
        assert_eq!(summary.workers.len(), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn thousand_jobs_on_a_hundred_workers() {
        let config = PoolConfig::default()
            .with_worker_count(100)
            .with_max_delay(Duration::from_millis(50))
            .with_tasks(1000)
            .with_skip_compute(true);

        let mut reports: Vec<JobReport> = Vec::new();
        let summary = pool(config).run(0..1000i64, &mut reports).await.unwrap();

        assert_eq!(reports.len(), 1000);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.input, i as i64);
            assert_eq!(report.outcome, JobOutcome::Completed(BigUint::from(i)));
        }
        assert_eq!(summary.timed_out, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.processed(), 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn factorial_reports_carry_parity() {
        let config = PoolConfig::default().with_worker_count(2);

        let mut reports: Vec<JobReport> = Vec::new();
        pool(config).run([0, 1, 3, 5], &mut reports).await.unwrap();

        let seen: Vec<(String, bool)> = reports
            .iter()
            .map(|r| (r.value().to_string(), r.is_odd()))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("1".to_string(), true),
                ("1".to_string(), true),
                ("6".to_string(), false),
                ("120".to_string(), false),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_jobs_resolve_as_timeouts() {
        let config = PoolConfig::default()
            .with_worker_count(2)
            .with_initial_deadline(Duration::from_millis(20));
        let runner = Runner::factorial().with_delay(ArtificialDelay::Fixed(Duration::from_secs(5)));

        let started = Instant::now();
        let mut reports: Vec<JobReport> = Vec::new();
        let summary = pool(config)
            .with_runner(runner)
            .run([4, 5, 6, 7], &mut reports)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(reports.iter().all(|r| r.outcome.is_timed_out()));
        assert!(reports.iter().all(|r| r.value() == BigUint::from(0u32)));
        assert_eq!(summary.timed_out, 4);
        assert_eq!(summary.completed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn huge_threshold_does_not_break_the_run() {
        let config = PoolConfig::default()
            .with_worker_count(1)
            .with_history_window(1)
            .with_threshold(1e30)
            .with_skip_compute(true);
        assert!(config.validate().is_ok());

        let mut reports: Vec<JobReport> = Vec::new();
        let summary = pool(config).run([1, 2, 3], &mut reports).await.unwrap();

        let values: Vec<BigUint> = reports.iter().map(JobReport::value).collect();
        assert_eq!(
            values,
            vec![BigUint::from(1u32), BigUint::from(2u32), BigUint::from(3u32)]
        );
        assert_eq!(summary.completed, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_jobs_do_not_stop_the_run() {
        let config = PoolConfig::default().with_worker_count(2);

        let mut reports: Vec<JobReport> = Vec::new();
        let summary = pool(config)
            .run([3, -2, 4], &mut reports)
            .await
            .unwrap();

        assert_eq!(reports[0].value(), BigUint::from(6u32));
        assert!(matches!(reports[1].outcome, JobOutcome::Failed(_)));
        assert_eq!(reports[2].value(), BigUint::from(24u32));
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn custom_workload() {
        struct Double;
        impl Workload for Double {
            fn compute(&self, n: u64, _cancel: &CancellationToken) -> Option<BigUint> {
                Some(BigUint::from(n * 2))
            }
        }

        let config = PoolConfig::default().with_worker_count(3);
        let mut reports: Vec<JobReport> = Vec::new();
        pool(config)
            .with_workload(Arc::new(Double))
            .run(RandomInputs::seeded(10, 0, 100, 7), &mut reports)
            .await
            .unwrap();

        let expected: Vec<BigUint> = RandomInputs::seeded(10, 0, 100, 7)
            .map(|n| BigUint::from(n as u64 * 2))
            .collect();
        let values: Vec<BigUint> = reports.iter().map(JobReport::value).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn start_exposes_ordered_pending_results() {
        let config = PoolConfig::default()
            .with_worker_count(3)
            .with_skip_compute(true);
        let pool = pool(config);

        let (input_tx, input_rx) = mpsc::channel(3);
        let mut handle = pool.start(input_rx);

        tokio::spawn(async move {
            for input in [7, 8, 9] {
                input_tx.send(input).await.unwrap();
            }
        });

        let mut seen = Vec::new();
        while let Some(pending) = handle.next_result().await {
            let input = pending.input();
            seen.push((input, pending.wait().await.unwrap().value()));
        }
        assert_eq!(
            seen,
            vec![
                (7, BigUint::from(7u32)),
                (8, BigUint::from(8u32)),
                (9, BigUint::from(9u32)),
            ]
        );

        let stats = handle.join().await.unwrap();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.iter().map(WorkerStats::processed).sum::<usize>(), 3);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_summary() {
        let config = PoolConfig::default().with_worker_count(2);
        let mut reports: Vec<JobReport> = Vec::new();
        let summary = pool(config)
            .run(std::iter::empty::<i64>(), &mut reports)
            .await
            .unwrap();
        assert!(reports.is_empty());
        assert_eq!(summary.processed(), 0);
        assert_eq!(summary.worker_count, 2);
    }

    #[test]
    fn summary_aggregates_worker_stats() {
        let workers = vec![
            WorkerStats {
                worker: 0,
                completed: 3,
                timed_out: 1,
                failed: 0,
            },
            WorkerStats {
                worker: 1,
                completed: 2,
                timed_out: 0,
                failed: 1,
            },
        ];
        let summary = RunSummary::from_workers(Uuid::nil(), workers, Duration::from_millis(1500));
        assert_eq!(summary.completed, 5);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed(), 7);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["run_id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["worker_count"], 2);
        assert_eq!(json["workers"][1]["failed"], 1);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = PoolConfig::default().with_history_window(0);
        assert_eq!(
            WorkerPool::new(config).unwrap_err(),
            ConfigError::ZeroHistoryWindow
        );
    }

    #[test]
    fn worker_count_defaults_to_cpus_plus_one() {
        let pool = pool(PoolConfig::default());
        assert_eq!(pool.worker_count(), num_cpus::get() + 1);

        let pool = WorkerPool::new(PoolConfig::default().with_worker_count(5)).unwrap();
        assert_eq!(pool.worker_count(), 5);
    }
}
