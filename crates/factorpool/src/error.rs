//! Error types for pool configuration and runs.

/// Invalid or unparsable pool settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("empty input range: min {min} must be below max {max}")]
    EmptyInputRange { min: i64, max: i64 },

    #[error("negative input bound: {0}")]
    NegativeInput(i64),

    #[error("history window must hold at least one sample")]
    ZeroHistoryWindow,

    #[error("threshold multiplier must be finite and positive, got {0}")]
    InvalidThreshold(f64),

    #[error("initial deadline must be non-zero")]
    ZeroDeadline,
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, value: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures while wiring or draining a pool run.
///
/// Timeouts and aborted jobs are not errors; they are carried by
/// [`JobOutcome`](crate::slot::JobOutcome).
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("result slot {index} was dropped before being resolved")]
    SlotDropped { index: usize },

    #[error("result stream ended after {received} of {expected} results")]
    ResultsExhausted { received: usize, expected: usize },

    #[error("worker task failed: {0}")]
    WorkerJoin(#[from] tokio::task::JoinError),

    #[error("result sink failed: {0}")]
    Sink(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
