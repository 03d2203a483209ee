//! Rolling window of successful run durations, owned by a single worker.

use std::time::Duration;

/// Fixed-capacity ring of the most recent successful durations.
///
/// The window yields no average until it has been filled once; slots that
/// were never written are not meaningful.
#[derive(Debug, Clone)]
pub struct DurationHistory {
    samples: Vec<Duration>,
    recorded: usize,
}

impl DurationHistory {
    /// # Panics
    ///
    /// Panics if `capacity` is zero. [`PoolConfig::validate`](crate::PoolConfig::validate)
    /// rejects such configs before a worker is started.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "duration history needs a non-zero capacity");
        Self {
            samples: vec![Duration::ZERO; capacity],
            recorded: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Number of successful runs recorded so far (not capped by capacity).
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    pub fn is_full(&self) -> bool {
        self.recorded >= self.capacity()
    }

    /// Store a sample, overwriting the oldest one once the window is full.
    pub fn record(&mut self, elapsed: Duration) {
        let slot = self.recorded % self.capacity();
        self.samples[slot] = elapsed;
        self.recorded += 1;
    }

    /// Mean of the window, or `None` while it has not been filled once.
    pub fn average(&self) -> Option<Duration> {
        if !self.is_full() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        match u32::try_from(self.capacity()) {
            Ok(count) => Some(total / count),
            Err(_) => Some(total.div_f64(self.capacity() as f64)),
        }
    }

    /// Deadline for the next attempt: `initial` until the window is full,
    /// then the window average scaled by `threshold`.
    ///
    /// A scaled deadline too large for a [`Duration`] saturates at
    /// [`Duration::MAX`].
    pub fn deadline(&self, initial: Duration, threshold: f64) -> Duration {
        match self.average() {
            Some(average) => {
                Duration::try_from_secs_f64(average.as_secs_f64() * threshold)
                    .unwrap_or(Duration::MAX)
            }
            None => initial,
        }
    }

    /// The most recently recorded sample.
    pub fn last(&self) -> Option<Duration> {
        let last = self.recorded.checked_sub(1)?;
        Some(self.samples[last % self.capacity()])
    }
}
