//! Pool configuration.
//!
//! Settings come from defaults, then `FACTORPOOL_*` environment variables,
//! then command-line flags (applied by the binary through the `with_*`
//! setters). A config is validated once and stays immutable for a run.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_WORKERS: &str = "FACTORPOOL_WORKERS";
pub const ENV_WINDOW: &str = "FACTORPOOL_WINDOW";
pub const ENV_THRESHOLD: &str = "FACTORPOOL_THRESHOLD";
pub const ENV_DEADLINE_MS: &str = "FACTORPOOL_DEADLINE_MS";
pub const ENV_DELAY_MS: &str = "FACTORPOOL_DELAY_MS";
pub const ENV_TASKS: &str = "FACTORPOOL_TASKS";
pub const ENV_MIN_INPUT: &str = "FACTORPOOL_MIN_INPUT";
pub const ENV_MAX_INPUT: &str = "FACTORPOOL_MAX_INPUT";
pub const ENV_SKIP_COMPUTE: &str = "FACTORPOOL_SKIP_COMPUTE";

/// Deadline used until a worker has a full window of samples.
pub const DEFAULT_INITIAL_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Worker count override. 0 picks `available parallelism + 1`.
    pub worker_count: usize,
    /// Number of successful runs averaged for the adaptive deadline.
    pub history_window: usize,
    /// Multiplier applied to the average duration.
    pub threshold: f64,
    /// Deadline for a worker's first `history_window` successful jobs.
    pub initial_deadline: Duration,
    /// Upper bound of the random delay added after each run. Zero disables it.
    pub max_delay: Duration,
    /// Number of inputs generated by a full run.
    pub tasks: usize,
    /// Inclusive lower bound of generated inputs.
    pub min_input: i64,
    /// Exclusive upper bound of generated inputs.
    pub max_input: i64,
    /// Return `n` instead of computing `f(n)`.
    pub skip_compute: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            history_window: 20,
            threshold: 1.1,
            initial_deadline: DEFAULT_INITIAL_DEADLINE,
            max_delay: Duration::ZERO,
            tasks: 100,
            min_input: 3,
            max_input: 1000,
            skip_compute: false,
        }
    }
}

impl PoolConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `FACTORPOOL_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_WORKERS) {
            config.worker_count = parse_value(ENV_WORKERS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_WINDOW) {
            config.history_window = parse_value(ENV_WINDOW, &raw)?;
        }
        if let Some(raw) = lookup(ENV_THRESHOLD) {
            config.threshold = parse_value(ENV_THRESHOLD, &raw)?;
        }
        if let Some(raw) = lookup(ENV_DEADLINE_MS) {
            config.initial_deadline = Duration::from_millis(parse_value(ENV_DEADLINE_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_DELAY_MS) {
            config.max_delay = Duration::from_millis(parse_value(ENV_DELAY_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_TASKS) {
            config.tasks = parse_value(ENV_TASKS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MIN_INPUT) {
            config.min_input = parse_value(ENV_MIN_INPUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_INPUT) {
            config.max_input = parse_value(ENV_MAX_INPUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SKIP_COMPUTE) {
            config.skip_compute = parse_flag(ENV_SKIP_COMPUTE, &raw)?;
        }

        Ok(config)
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_initial_deadline(mut self, deadline: Duration) -> Self {
        self.initial_deadline = deadline;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_tasks(mut self, tasks: usize) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_input_range(mut self, min_input: i64, max_input: i64) -> Self {
        self.min_input = min_input;
        self.max_input = max_input;
        self
    }

    pub fn with_skip_compute(mut self, skip_compute: bool) -> Self {
        self.skip_compute = skip_compute;
        self
    }

    /// Resolved number of workers for a run.
    pub fn worker_count(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        num_cpus::get() + 1
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_window == 0 {
            return Err(ConfigError::ZeroHistoryWindow);
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        if self.initial_deadline.is_zero() {
            return Err(ConfigError::ZeroDeadline);
        }
        if self.min_input < 0 {
            return Err(ConfigError::NegativeInput(self.min_input));
        }
        if self.min_input >= self.max_input {
            return Err(ConfigError::EmptyInputRange {
                min: self.min_input,
                max: self.max_input,
            });
        }
        Ok(())
    }
}

/// Parse a single setting, naming `key` in the error.
pub fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, raw, e))
}

/// Parse a boolean setting (`1/true/yes/on`, `0/false/no/off`).
pub fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw, "expected a boolean")),
    }
}
