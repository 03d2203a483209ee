//! factorpool: adaptive-timeout worker pool for CPU-bound jobs.

mod history;
mod parity;
mod slot;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod input;
pub mod report;
pub mod runner;
pub mod supervisor;
pub mod worker;

/// Crate version, as reported by `factorpool --version`.
pub const FACTORPOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::PoolConfig;
pub use error::{ConfigError, PoolError};
pub use history::DurationHistory;
pub use input::RandomInputs;
pub use parity::is_odd;
pub use report::{JobReport, ReportFormat, ReportWriter, ResultSink};
pub use runner::{ArtificialDelay, CancellationToken, Factorial, Runner, Workload};
pub use slot::{JobOutcome, PendingResult, ResultSlot, result_slot};
pub use supervisor::{PoolHandle, RunSummary, WorkerPool};
pub use worker::{WorkerConfig, WorkerStats, run_worker};
