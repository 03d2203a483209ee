//! Result consumers.

use std::io::Write;

use num_bigint::BigUint;
use serde::{Serialize, Serializer};

use crate::error::PoolError;
use crate::parity::is_odd;
use crate::slot::JobOutcome;

/// One resolved job, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    /// Zero-based submission index.
    pub index: usize,
    pub input: i64,
    pub outcome: JobOutcome,
}

impl JobReport {
    pub fn new(index: usize, input: i64, outcome: JobOutcome) -> Self {
        Self {
            index,
            input,
            outcome,
        }
    }

    /// Computed value, or the sentinel `0`.
    pub fn value(&self) -> BigUint {
        self.outcome.value()
    }

    pub fn is_odd(&self) -> bool {
        is_odd(&self.value())
    }

    /// Human-readable line: `"{n}.: {input}! = {value}, isOdd={bool}"`.
    pub fn to_line(&self) -> String {
        let line = format!(
            "{}.: {}! = {}, isOdd={}",
            self.index + 1,
            self.input,
            self.value(),
            self.is_odd()
        );
        match &self.outcome {
            JobOutcome::Completed(_) => line,
            JobOutcome::TimedOut => format!("{line} [timed out]"),
            JobOutcome::Failed(reason) => format!("{line} [failed: {reason}]"),
        }
    }
}

#[derive(Serialize)]
struct ReportView<'a> {
    index: usize,
    input: i64,
    status: &'static str,
    value: String,
    is_odd: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for JobReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.value();
        let error = match &self.outcome {
            JobOutcome::Failed(reason) => Some(reason.as_str()),
            _ => None,
        };
        ReportView {
            index: self.index,
            input: self.input,
            status: self.outcome.as_str(),
            is_odd: is_odd(&value),
            value: value.to_str_radix(10),
            error,
        }
        .serialize(serializer)
    }
}

/// Receives reports in submission order.
pub trait ResultSink {
    fn consume(&mut self, report: JobReport) -> Result<(), PoolError>;

    /// Called once after the last report.
    fn finish(&mut self) -> Result<(), PoolError> {
        Ok(())
    }
}

impl ResultSink for Vec<JobReport> {
    fn consume(&mut self, report: JobReport) -> Result<(), PoolError> {
        self.push(report);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Writes reports to any [`Write`] as text or JSON lines.
pub struct ReportWriter<W: Write> {
    out: W,
    format: ReportFormat,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W, format: ReportFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ResultSink for ReportWriter<W> {
    fn consume(&mut self, report: JobReport) -> Result<(), PoolError> {
        match self.format {
            ReportFormat::Text => writeln!(self.out, "{}", report.to_line())?,
            ReportFormat::Json => {
                serde_json::to_writer(&mut self.out, &report).map_err(std::io::Error::from)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PoolError> {
        self.out.flush()?;
        Ok(())
    }
}
