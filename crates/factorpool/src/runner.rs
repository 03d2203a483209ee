//! Cancellable unit-of-work runner.
//!
//! The CPU-bound part of a job runs on tokio's blocking pool and checks its
//! [`CancellationToken`] before every step. A cancelled runner never writes
//! to its output channel.

use std::sync::Arc;
use std::time::Duration;

use num_bigint::BigUint;
use rand::Rng;
use tokio::sync::oneshot;
pub use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;

/// A CPU-bound computation that can be abandoned between steps.
pub trait Workload: Send + Sync + 'static {
    /// Compute `f(n)`, or `None` if `cancel` fired before the last step.
    fn compute(&self, n: u64, cancel: &CancellationToken) -> Option<BigUint>;
}

/// `n!` by repeated multiplication, one cancellation check per factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Factorial;

impl Workload for Factorial {
    fn compute(&self, n: u64, cancel: &CancellationToken) -> Option<BigUint> {
        let mut result = BigUint::from(1u32);
        for factor in 1..=n {
            if cancel.is_cancelled() {
                return None;
            }
            result *= factor;
        }
        Some(result)
    }
}

/// Latency injected after a computation finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArtificialDelay {
    #[default]
    None,
    /// Always wait exactly this long.
    Fixed(Duration),
    /// Wait a uniformly random time in `[0, max)`.
    UpTo(Duration),
}

impl ArtificialDelay {
    /// Random delay bounded by `max`; disabled when `max` is zero.
    pub fn up_to(max: Duration) -> Self {
        if max.is_zero() {
            Self::None
        } else {
            Self::UpTo(max)
        }
    }

    pub fn sample(&self) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::UpTo(max) => {
                let max_nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
                if max_nanos == 0 {
                    return Duration::ZERO;
                }
                Duration::from_nanos(rand::thread_rng().gen_range(0..max_nanos))
            }
        }
    }
}

/// Runs one job's workload and delivers the value through a oneshot.
#[derive(Clone)]
pub struct Runner {
    workload: Arc<dyn Workload>,
    delay: ArtificialDelay,
    skip_compute: bool,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("delay", &self.delay)
            .field("skip_compute", &self.skip_compute)
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn new(workload: Arc<dyn Workload>) -> Self {
        Self {
            workload,
            delay: ArtificialDelay::None,
            skip_compute: false,
        }
    }

    pub fn factorial() -> Self {
        Self::new(Arc::new(Factorial))
    }

    /// Factorial runner carrying the config's debug settings.
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::factorial()
            .with_delay(ArtificialDelay::up_to(config.max_delay))
            .with_skip_compute(config.skip_compute)
    }

    pub fn with_workload(mut self, workload: Arc<dyn Workload>) -> Self {
        self.workload = workload;
        self
    }

    pub fn with_delay(mut self, delay: ArtificialDelay) -> Self {
        self.delay = delay;
        self
    }

    /// Return `n` itself instead of running the workload.
    pub fn with_skip_compute(mut self, skip_compute: bool) -> Self {
        self.skip_compute = skip_compute;
        self
    }

    /// Blocking computation of `f(n)`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is negative.
    pub fn compute(&self, n: i64, cancel: &CancellationToken) -> Option<BigUint> {
        assert!(n >= 0, "n! cannot be computed for negative input {n}");
        let n = n as u64;
        if self.skip_compute {
            return Some(BigUint::from(n));
        }
        self.workload.compute(n, cancel)
    }

    /// Run the job to completion and send the value on `output`.
    ///
    /// Nothing is sent if `cancel` fires during the computation or the
    /// artificial delay. A panic in the computation is re-raised on the
    /// calling task.
    pub async fn run(self, n: i64, cancel: CancellationToken, output: oneshot::Sender<BigUint>) {
        let runner = self.clone();
        let token = cancel.clone();
        let computed = tokio::task::spawn_blocking(move || runner.compute(n, &token)).await;

        let value = match computed {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::trace!(input = n, "Runner cancelled mid-computation");
                return;
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                tracing::warn!(input = n, error = %e, "Blocking computation did not finish");
                return;
            }
        };

        let delay = self.delay.sample();
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::trace!(input = n, "Runner cancelled during artificial delay");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if output.send(value).is_err() {
            tracing::trace!(input = n, "Runner result discarded, receiver gone");
        }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::factorial()
    }
}
