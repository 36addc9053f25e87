use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::name::Name;

/// One partition of a named log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogPartition {
    pub name: Name,
    pub partition: u32,
}

impl LogPartition {
    pub fn of(name: Name, partition: u32) -> Self {
        Self { name, partition }
    }
}

impl Display for LogPartition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.name.id(), self.partition)
    }
}

/// Location of a record inside a partition, comparable within that
/// partition only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOffset {
    pub partition: LogPartition,
    pub offset: u64,
}

impl LogOffset {
    pub fn of(partition: LogPartition, offset: u64) -> Self {
        Self { partition, offset }
    }
}

impl Display for LogOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:+{}", self.partition, self.offset)
    }
}

/// Committed position versus end position, per partition or aggregated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLag {
    lower: u64,
    upper: u64,
}

impl LogLag {
    pub fn new(lower: u64, upper: u64) -> Self {
        Self { lower, upper }
    }

    /// Lag with no committed position.
    pub fn of(lag: u64) -> Self {
        Self {
            lower: 0,
            upper: lag,
        }
    }

    pub fn lower(&self) -> u64 {
        self.lower
    }

    pub fn upper(&self) -> u64 {
        self.upper
    }

    pub fn lag(&self) -> u64 {
        self.upper.saturating_sub(self.lower)
    }

    /// Sum lags across partitions.
    pub fn aggregate<I: IntoIterator<Item = LogLag>>(lags: I) -> Self {
        let mut lower = 0;
        let mut upper = 0;
        for lag in lags {
            lower += lag.lower;
            upper += lag.upper;
        }
        Self { lower, upper }
    }
}

impl Display for LogLag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "lag: {} [{}, {}]", self.lag(), self.lower, self.upper)
    }
}

/// A decoded message together with the offset it was read from.
#[derive(Debug, Clone)]
pub struct LogRecord<M> {
    pub message: M,
    pub offset: LogOffset,
}

impl<M> LogRecord<M> {
    pub fn new(message: M, offset: LogOffset) -> Self {
        Self { message, offset }
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn offset(&self) -> &LogOffset {
        &self.offset
    }
}

/// Age of the last committed record of a group: `lower` is that record's
/// watermark timestamp, `upper` the observation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Latency {
    lower: u64,
    upper: u64,
    lag: LogLag,
    key: Option<String>,
}

impl Latency {
    pub fn new(lower: u64, upper: u64, lag: LogLag, key: Option<String>) -> Self {
        Self {
            lower,
            upper,
            lag,
            key,
        }
    }

    /// Aggregate per-partition latencies into one.
    pub fn of(latencies: &[Latency]) -> Self {
        let lower = latencies
            .iter()
            .filter(|l| l.lower > 0)
            .map(|l| l.lower)
            .min()
            .unwrap_or(0);
        let upper = latencies.iter().map(|l| l.upper).max().unwrap_or(0);
        let lag = LogLag::aggregate(latencies.iter().map(|l| l.lag));
        Self {
            lower,
            upper,
            lag,
            key: None,
        }
    }

    /// Milliseconds behind, zero once the group is caught up.
    pub fn latency(&self) -> u64 {
        if self.lag.lag() > 0 && self.lower > 0 {
            self.upper.saturating_sub(self.lower)
        } else {
            0
        }
    }

    pub fn lower(&self) -> u64 {
        self.lower
    }

    pub fn upper(&self) -> u64 {
        self.upper
    }

    pub fn lag(&self) -> LogLag {
        self.lag
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

impl Display for Latency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "latency: {}ms, {}, key: {}",
            self.latency(),
            self.lag,
            self.key.as_deref().unwrap_or("-")
        )
    }
}
